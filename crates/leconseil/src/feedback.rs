// Click and purchase attribution

use crate::clock::Clock;
use crate::error::Result;
use lestockage::{Actor, EventSink, RecommendationStore, TrackedEvent};
use serde_json::Value;
use tracing::{info, warn};

/// Event emitted for every recorded click
pub const CLICK_EVENT: &str = "recommendation_clicked";

/// Event emitted for every recorded purchase
pub const PURCHASE_EVENT: &str = "recommendation_purchased";

/// Flips feedback flags on stored recommendations and reports them to analytics.
pub struct FeedbackRecorder<'a> {
    recommendations: &'a dyn RecommendationStore,
    events: &'a dyn EventSink,
    clock: &'a dyn Clock,
}

impl<'a> FeedbackRecorder<'a> {
    /// Create a recorder
    pub fn new(
        recommendations: &'a dyn RecommendationStore,
        events: &'a dyn EventSink,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            recommendations,
            events,
            clock,
        }
    }

    /// Mark a recommendation as clicked.
    ///
    /// Returns the number of rows changed; an unknown id changes none. The
    /// click event is emitted either way.
    pub fn record_click(&self, recommendation_id: i64) -> Result<usize> {
        let now = self.clock.now();
        let changed = self.recommendations.mark_clicked(recommendation_id, now)?;
        info!(recommendation_id, changed, "click recorded");

        self.emit(TrackedEvent::new(CLICK_EVENT, now).with("recommendation_id", recommendation_id));
        Ok(changed)
    }

    /// Mark every recommendation of `product_id` made to `actor` as purchased.
    ///
    /// Zero matching rows is not an error.
    pub fn record_purchase(&self, product_id: i64, actor: &Actor) -> Result<usize> {
        let now = self.clock.now();
        let changed = self.recommendations.mark_purchased(product_id, actor, now)?;
        info!(product_id, %actor, changed, "purchase recorded");

        let event = TrackedEvent::new(PURCHASE_EVENT, now)
            .for_actor(actor.clone())
            .with("product_id", product_id)
            .with("user_id", actor.user_id().map_or(Value::Null, Value::from))
            .with("session_id", actor.session_id().map_or(Value::Null, Value::from));
        self.emit(event);
        Ok(changed)
    }

    fn emit(&self, event: TrackedEvent) {
        if let Err(e) = self.events.track(&event) {
            warn!(event = %event.name, error = %e, "analytics tracking failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use chrono::{DateTime, Duration, Utc};
    use lestockage::{
        NewRecommendation, RecommendationQuery, RecommendationType, Storage, StorageError,
    };
    use tempfile::NamedTempFile;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn track(&self, _event: &TrackedEvent) -> lestockage::Result<()> {
            Err(StorageError::unavailable("analytics offline"))
        }
        fn events(
            &self,
            _name: &str,
            _since: DateTime<Utc>,
        ) -> lestockage::Result<Vec<TrackedEvent>> {
            Ok(Vec::new())
        }
    }

    fn seeded() -> (NamedTempFile, Storage, i64) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        storage
            .insert_batch(&[NewRecommendation {
                actor: Actor::user(1),
                product_id: 3,
                kind: RecommendationType::Trending,
                score: 0.5,
                reasoning: Vec::new(),
                created_at: Utc::now(),
            }])
            .unwrap();
        let id = storage.list(&RecommendationQuery::default()).unwrap()[0].id;
        (temp_file, storage, id)
    }

    #[test]
    fn test_click_sets_flag_and_tracks() {
        let (_file, storage, id) = seeded();
        let recorder = FeedbackRecorder::new(&storage, &storage, &SystemClock);

        assert_eq!(recorder.record_click(id).unwrap(), 1);
        assert!(storage.list(&RecommendationQuery::default()).unwrap()[0].was_clicked);

        let events = storage
            .events(CLICK_EVENT, Utc::now() - Duration::minutes(1))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["recommendation_id"], id);
    }

    #[test]
    fn test_unknown_click_still_tracks() {
        let (_file, storage, id) = seeded();
        let recorder = FeedbackRecorder::new(&storage, &storage, &SystemClock);

        assert_eq!(recorder.record_click(id + 1000).unwrap(), 0);
        let events = storage
            .events(CLICK_EVENT, Utc::now() - Duration::minutes(1))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_purchase_payload_has_null_side() {
        let (_file, storage, _id) = seeded();
        let recorder = FeedbackRecorder::new(&storage, &storage, &SystemClock);

        assert_eq!(recorder.record_purchase(3, &Actor::user(1)).unwrap(), 1);
        assert_eq!(recorder.record_purchase(3, &Actor::session("nobody")).unwrap(), 0);

        let events = storage
            .events(PURCHASE_EVENT, Utc::now() - Duration::minutes(1))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["user_id"], 1);
        assert_eq!(events[0].payload["session_id"], Value::Null);
        assert_eq!(events[1].payload["session_id"], "nobody");
        assert_eq!(events[1].payload["user_id"], Value::Null);
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let (_file, storage, id) = seeded();
        let recorder = FeedbackRecorder::new(&storage, &FailingSink, &SystemClock);
        assert_eq!(recorder.record_click(id).unwrap(), 1);
        assert_eq!(recorder.record_purchase(3, &Actor::user(1)).unwrap(), 1);
    }
}
