// Analytics event sink

use crate::error::Result;
use crate::records::{from_unix, Actor, JsonMap, TrackedEvent};
use crate::schema::Storage;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Destination for telemetry events.
///
/// Producers treat tracking as fire-and-forget: a failed `track` is logged
/// by the caller and never fails the operation that emitted the event.
pub trait EventSink {
    /// Record one event
    fn track(&self, event: &TrackedEvent) -> Result<()>;

    /// Events with this name emitted at or after `since`, oldest first
    fn events(&self, name: &str, since: DateTime<Utc>) -> Result<Vec<TrackedEvent>>;
}

/// Number of events per name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCount {
    /// Event name
    pub name: String,
    /// Events emitted
    pub count: i64,
}

impl Storage {
    /// Count events per name since an instant, busiest first
    pub fn count_events_by_name(&self, since: DateTime<Utc>) -> Result<Vec<EventCount>> {
        let mut stmt = self.conn().prepare(
            "SELECT event_name, COUNT(*) AS count FROM analytics_events
             WHERE created_at >= ?1
             GROUP BY event_name
             ORDER BY count DESC, event_name ASC",
        )?;

        let counts = stmt
            .query_map(params![since.timestamp()], |row| {
                Ok(EventCount {
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(counts)
    }
}

impl EventSink for Storage {
    fn track(&self, event: &TrackedEvent) -> Result<()> {
        let actor = event.actor.as_ref();
        self.conn().execute(
            "INSERT INTO analytics_events (user_id, session_id, event_name, event_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                actor.and_then(Actor::user_id),
                actor.and_then(Actor::session_id),
                event.name,
                serde_json::to_string(&event.payload)?,
                event.created_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn events(&self, name: &str, since: DateTime<Utc>) -> Result<Vec<TrackedEvent>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, session_id, event_name, event_data, created_at
             FROM analytics_events
             WHERE event_name = ?1 AND created_at >= ?2
             ORDER BY created_at ASC, id ASC",
        )?;

        let raw = stmt
            .query_map(params![name, since.timestamp()], |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(user_id, session_id, name, data, created_at)| {
                let actor = match (user_id, session_id) {
                    (None, None) => None,
                    (user_id, session_id) => Some(Actor::from_columns(user_id, session_id)?),
                };
                Ok(TrackedEvent {
                    actor,
                    name,
                    payload: serde_json::from_str::<JsonMap>(&data)?,
                    created_at: from_unix(created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_track_and_read_back() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        let now = Utc::now();

        storage
            .track(&TrackedEvent::new("recommendation_clicked", now).with("recommendation_id", 42))
            .unwrap();
        storage
            .track(
                &TrackedEvent::new("recommendation_purchased", now)
                    .for_actor(Actor::session("s-9"))
                    .with("product_id", 7),
            )
            .unwrap();

        let clicks = storage
            .events("recommendation_clicked", now - Duration::seconds(5))
            .unwrap();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].actor, None);
        assert_eq!(clicks[0].payload["recommendation_id"], 42);

        let purchases = storage
            .events("recommendation_purchased", now - Duration::seconds(5))
            .unwrap();
        assert_eq!(purchases[0].actor, Some(Actor::session("s-9")));
    }

    #[test]
    fn test_count_events_by_name() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        let now = Utc::now();

        assert!(storage.count_events_by_name(now).unwrap().is_empty());
        for name in ["a", "b", "b"] {
            storage.track(&TrackedEvent::new(name, now)).unwrap();
        }
        let counts = storage.count_events_by_name(now - Duration::seconds(1)).unwrap();
        assert_eq!(counts[0], EventCount { name: "b".into(), count: 2 });
        assert_eq!(counts[1].name, "a");
    }
}
