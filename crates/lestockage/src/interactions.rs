// Interaction log: append, history reads, grouped counts

use crate::error::{Result, StorageError};
use crate::records::{
    from_unix, round_to, Actor, Interaction, InteractionType, JsonMap, NewInteraction,
};
use crate::schema::Storage;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};

/// Filter for reading one actor's history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    /// Restrict to these types; empty means all types
    pub kinds: Vec<InteractionType>,
    /// Only interactions at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of rows
    pub limit: Option<usize>,
    /// Newest first instead of oldest first
    pub newest_first: bool,
}

impl HistoryQuery {
    /// History restricted to the given types
    pub fn of_kinds(kinds: &[InteractionType]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            ..Self::default()
        }
    }

    /// Only keep interactions at or after `since`
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Cap the number of rows
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order by recency, newest first
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }
}

/// Grouping filter for per-product counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductCountQuery {
    /// Only count interactions by these actors; `None` counts everyone
    pub actors: Option<Vec<Actor>>,
    /// Restrict to these types; empty means all types
    pub kinds: Vec<InteractionType>,
    /// Only interactions at or after this instant
    pub since: Option<DateTime<Utc>>,
}

/// Interactions per actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorCount {
    /// Grouping key
    pub actor: Actor,
    /// Number of matching interactions
    pub count: u64,
}

/// Interactions per product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCount {
    /// Grouping key
    pub product_id: i64,
    /// Number of matching interactions
    pub count: u64,
}

/// Read access to the interaction log.
///
/// Grouped counts come back ordered by count descending, then by key, so
/// callers can rank without re-sorting.
pub trait InteractionStore {
    /// Append an interaction and return its id
    fn record(&self, interaction: &NewInteraction) -> Result<i64>;

    /// One actor's interactions matching the query
    fn history(&self, actor: &Actor, query: &HistoryQuery) -> Result<Vec<Interaction>>;

    /// Count interactions with any of `product_ids`, grouped by actor, leaving out `exclude`
    fn count_by_actor(&self, product_ids: &[i64], exclude: &Actor) -> Result<Vec<ActorCount>>;

    /// Count interactions grouped by product
    fn count_by_product(&self, query: &ProductCountQuery) -> Result<Vec<ProductCount>>;
}

const INTERACTION_COLUMNS: &str =
    "id, user_id, session_id, product_id, interaction_type, metadata, value, created_at";

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn push_kinds(kinds: &[InteractionType], clauses: &mut Vec<String>, values: &mut Vec<Value>) {
    if kinds.is_empty() {
        return;
    }
    clauses.push(format!("interaction_type IN ({})", placeholders(kinds.len())));
    values.extend(kinds.iter().map(|k| Value::Text(k.as_str().to_string())));
}

pub(crate) fn push_actor(actor: &Actor, clauses: &mut Vec<String>, values: &mut Vec<Value>) {
    match actor {
        Actor::User(id) => {
            clauses.push("user_id = ?".to_string());
            values.push(Value::Integer(*id));
        }
        Actor::Session(id) => {
            clauses.push("session_id = ?".to_string());
            values.push(Value::Text(id.clone()));
        }
    }
}

pub(crate) fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// Raw row, validated after the rusqlite closure so errors keep their type
struct InteractionRow {
    id: i64,
    user_id: Option<i64>,
    session_id: Option<String>,
    product_id: i64,
    kind: String,
    metadata: Option<String>,
    value: Option<f64>,
    created_at: i64,
}

impl InteractionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            product_id: row.get(3)?,
            kind: row.get(4)?,
            metadata: row.get(5)?,
            value: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_interaction(self) -> Result<Interaction> {
        let kind = InteractionType::from_str_name(&self.kind).ok_or_else(|| {
            StorageError::invalid(format!("unknown interaction type: {}", self.kind))
        })?;
        let metadata = match self.metadata {
            Some(raw) => Some(serde_json::from_str::<JsonMap>(&raw)?),
            None => None,
        };

        Ok(Interaction {
            id: self.id,
            actor: Actor::from_columns(self.user_id, self.session_id)?,
            product_id: self.product_id,
            kind,
            metadata,
            value: self.value,
            created_at: from_unix(self.created_at)?,
        })
    }
}

impl InteractionStore for Storage {
    fn record(&self, interaction: &NewInteraction) -> Result<i64> {
        let metadata = match &interaction.metadata {
            Some(map) => Some(serde_json::to_string(map)?),
            None => None,
        };

        self.conn().execute(
            "INSERT INTO user_interactions (user_id, session_id, product_id, interaction_type,
                 metadata, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                interaction.actor.user_id(),
                interaction.actor.session_id(),
                interaction.product_id,
                interaction.kind.as_str(),
                metadata,
                interaction.value.map(|v| round_to(v, 2)),
                interaction.created_at.timestamp(),
            ],
        )?;

        Ok(self.conn().last_insert_rowid())
    }

    fn history(&self, actor: &Actor, query: &HistoryQuery) -> Result<Vec<Interaction>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        push_actor(actor, &mut clauses, &mut values);
        push_kinds(&query.kinds, &mut clauses, &mut values);
        if let Some(since) = query.since {
            clauses.push("created_at >= ?".to_string());
            values.push(Value::Integer(since.timestamp()));
        }

        let order = if query.newest_first {
            "created_at DESC, id DESC"
        } else {
            "created_at ASC, id ASC"
        };
        let mut sql = format!(
            "SELECT {} FROM user_interactions{} ORDER BY {}",
            INTERACTION_COLUMNS,
            where_sql(&clauses),
            order
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(values.iter()), InteractionRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(InteractionRow::into_interaction).collect()
    }

    fn count_by_actor(&self, product_ids: &[i64], exclude: &Actor) -> Result<Vec<ActorCount>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut values: Vec<Value> = product_ids.iter().map(|id| Value::Integer(*id)).collect();
        let exclusion = match exclude {
            Actor::User(id) => {
                values.push(Value::Integer(*id));
                "(user_id IS NULL OR user_id <> ?)"
            }
            Actor::Session(id) => {
                values.push(Value::Text(id.clone()));
                "(session_id IS NULL OR session_id <> ?)"
            }
        };

        let sql = format!(
            "SELECT user_id, session_id, COUNT(*) AS co_occurrences
             FROM user_interactions
             WHERE product_id IN ({}) AND {}
             GROUP BY user_id, session_id
             ORDER BY co_occurrences DESC, user_id ASC, session_id ASC",
            placeholders(product_ids.len()),
            exclusion
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(user_id, session_id, count)| {
                Ok(ActorCount {
                    actor: Actor::from_columns(user_id, session_id)?,
                    count: count as u64,
                })
            })
            .collect()
    }

    fn count_by_product(&self, query: &ProductCountQuery) -> Result<Vec<ProductCount>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(actors) = &query.actors {
            if actors.is_empty() {
                return Ok(Vec::new());
            }
            let user_ids: Vec<i64> = actors.iter().filter_map(Actor::user_id).collect();
            let session_ids: Vec<&str> = actors.iter().filter_map(Actor::session_id).collect();

            let mut actor_clauses = Vec::new();
            if !user_ids.is_empty() {
                actor_clauses.push(format!("user_id IN ({})", placeholders(user_ids.len())));
                values.extend(user_ids.iter().map(|id| Value::Integer(*id)));
            }
            if !session_ids.is_empty() {
                actor_clauses.push(format!(
                    "session_id IN ({})",
                    placeholders(session_ids.len())
                ));
                values.extend(session_ids.iter().map(|id| Value::Text(id.to_string())));
            }
            clauses.push(format!("({})", actor_clauses.join(" OR ")));
        }

        push_kinds(&query.kinds, &mut clauses, &mut values);
        if let Some(since) = query.since {
            clauses.push("created_at >= ?".to_string());
            values.push(Value::Integer(since.timestamp()));
        }

        let sql = format!(
            "SELECT product_id, COUNT(*) AS interaction_count
             FROM user_interactions{}
             GROUP BY product_id
             ORDER BY interaction_count DESC, product_id ASC",
            where_sql(&clauses)
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let counts = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(ProductCount {
                    product_id: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(counts)
    }
}
