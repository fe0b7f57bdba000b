// Persisted recommendations and the feedback flags attached to them

use crate::error::{Result, StorageError};
use crate::interactions::{push_actor, where_sql};
use crate::records::{
    from_unix, round_to, Actor, NewRecommendation, RecommendationRecord, RecommendationType,
};
use crate::schema::Storage;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Filter for listing stored recommendations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationQuery {
    /// Only rows produced for this actor
    pub actor: Option<Actor>,
    /// Only rows of this type
    pub kind: Option<RecommendationType>,
    /// Only rows scoring at least this much
    pub min_score: Option<f64>,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

/// Shown/clicked/purchased totals for one recommendation type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    /// Recommendation type
    pub kind: RecommendationType,
    /// Rows persisted
    pub shown: u64,
    /// Rows with a click attributed
    pub clicked: u64,
    /// Rows with a purchase attributed
    pub purchased: u64,
}

impl FeedbackStats {
    /// Clicks per shown row, 0 when nothing was shown
    pub fn click_through_rate(&self) -> f64 {
        ratio(self.clicked, self.shown)
    }

    /// Purchases per shown row, 0 when nothing was shown
    pub fn conversion_rate(&self) -> f64 {
        ratio(self.purchased, self.shown)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64, 4)
    }
}

/// Storage for generated recommendations.
pub trait RecommendationStore {
    /// Insert rows in one transaction and return how many were written
    fn insert_batch(&self, rows: &[NewRecommendation]) -> Result<usize>;

    /// Flag one row as clicked; returns the number of rows changed (0 or 1)
    fn mark_clicked(&self, id: i64, at: DateTime<Utc>) -> Result<usize>;

    /// Flag every row for this product and actor as purchased; returns rows changed
    fn mark_purchased(&self, product_id: i64, actor: &Actor, at: DateTime<Utc>) -> Result<usize>;

    /// Fetch one row
    fn get(&self, id: i64) -> Result<Option<RecommendationRecord>>;

    /// Rows matching the query, best score first
    fn list(&self, query: &RecommendationQuery) -> Result<Vec<RecommendationRecord>>;

    /// Feedback totals grouped by recommendation type
    fn performance(&self) -> Result<Vec<FeedbackStats>>;
}

const RECOMMENDATION_COLUMNS: &str = "id, user_id, session_id, product_id, recommendation_type, \
     score, reasoning, was_clicked, was_purchased, created_at, updated_at";

struct RecommendationRow {
    id: i64,
    user_id: Option<i64>,
    session_id: Option<String>,
    product_id: i64,
    kind: String,
    score: f64,
    reasoning: String,
    was_clicked: bool,
    was_purchased: bool,
    created_at: i64,
    updated_at: i64,
}

impl RecommendationRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            product_id: row.get(3)?,
            kind: row.get(4)?,
            score: row.get(5)?,
            reasoning: row.get(6)?,
            was_clicked: row.get(7)?,
            was_purchased: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<RecommendationRecord> {
        let kind = RecommendationType::from_str_name(&self.kind).ok_or_else(|| {
            StorageError::invalid(format!("unknown recommendation type: {}", self.kind))
        })?;

        Ok(RecommendationRecord {
            id: self.id,
            actor: Actor::from_columns(self.user_id, self.session_id)?,
            product_id: self.product_id,
            kind,
            score: self.score,
            reasoning: serde_json::from_str(&self.reasoning)?,
            was_clicked: self.was_clicked,
            was_purchased: self.was_purchased,
            created_at: from_unix(self.created_at)?,
            updated_at: from_unix(self.updated_at)?,
        })
    }
}

impl RecommendationStore for Storage {
    fn insert_batch(&self, rows: &[NewRecommendation]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn().unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recommendations (user_id, session_id, product_id,
                     recommendation_type, score, reasoning, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            )?;
            for row in rows {
                let score = if row.score.is_nan() { 0.0 } else { row.score.clamp(0.0, 1.0) };
                stmt.execute(params![
                    row.actor.user_id(),
                    row.actor.session_id(),
                    row.product_id,
                    row.kind.as_str(),
                    round_to(score, 4),
                    serde_json::to_string(&row.reasoning)?,
                    row.created_at.timestamp(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(rows = rows.len(), "recommendations persisted");
        Ok(rows.len())
    }

    fn mark_clicked(&self, id: i64, at: DateTime<Utc>) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE recommendations SET was_clicked = 1, updated_at = ?2 WHERE id = ?1",
            params![id, at.timestamp()],
        )?;
        Ok(changed)
    }

    fn mark_purchased(&self, product_id: i64, actor: &Actor, at: DateTime<Utc>) -> Result<usize> {
        let mut clauses = vec!["product_id = ?".to_string()];
        let mut values = vec![Value::Integer(at.timestamp()), Value::Integer(product_id)];
        push_actor(actor, &mut clauses, &mut values);

        let sql = format!(
            "UPDATE recommendations SET was_purchased = 1, updated_at = ?{}",
            where_sql(&clauses)
        );
        let changed = self.conn().execute(&sql, params_from_iter(values.iter()))?;
        Ok(changed)
    }

    fn get(&self, id: i64) -> Result<Option<RecommendationRecord>> {
        let sql = format!(
            "SELECT {} FROM recommendations WHERE id = ?1",
            RECOMMENDATION_COLUMNS
        );
        let row = self
            .conn()
            .query_row(&sql, params![id], RecommendationRow::read)
            .optional()?;

        row.map(RecommendationRow::into_record).transpose()
    }

    fn list(&self, query: &RecommendationQuery) -> Result<Vec<RecommendationRecord>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(actor) = &query.actor {
            push_actor(actor, &mut clauses, &mut values);
        }
        if let Some(kind) = query.kind {
            clauses.push("recommendation_type = ?".to_string());
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(min_score) = query.min_score {
            clauses.push("score >= ?".to_string());
            values.push(Value::Real(min_score));
        }

        let mut sql = format!(
            "SELECT {} FROM recommendations{} ORDER BY score DESC, id ASC",
            RECOMMENDATION_COLUMNS,
            where_sql(&clauses)
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(values.iter()), RecommendationRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(RecommendationRow::into_record).collect()
    }

    fn performance(&self) -> Result<Vec<FeedbackStats>> {
        let mut stmt = self.conn().prepare(
            "SELECT recommendation_type, COUNT(*), SUM(was_clicked), SUM(was_purchased)
             FROM recommendations
             GROUP BY recommendation_type
             ORDER BY recommendation_type ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(kind, shown, clicked, purchased)| {
                let kind = RecommendationType::from_str_name(&kind).ok_or_else(|| {
                    StorageError::invalid(format!("unknown recommendation type: {}", kind))
                })?;
                Ok(FeedbackStats {
                    kind,
                    shown: shown as u64,
                    clicked: clicked as u64,
                    purchased: purchased as u64,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn storage() -> (NamedTempFile, Storage) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        (temp_file, storage)
    }

    fn row(
        actor: Actor,
        product_id: i64,
        kind: RecommendationType,
        score: f64,
    ) -> NewRecommendation {
        NewRecommendation {
            actor,
            product_id,
            kind,
            score,
            reasoning: vec!["Popular right now".to_string()],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let (_file, storage) = storage();
        let written = storage
            .insert_batch(&[row(Actor::user(1), 3, RecommendationType::Trending, 0.756818)])
            .unwrap();
        assert_eq!(written, 1);

        let listed = storage.list(&RecommendationQuery::default()).unwrap();
        assert_eq!(listed.len(), 1);
        let stored = storage.get(listed[0].id).unwrap().unwrap();
        assert_eq!(stored.score, 0.7568);
        assert_eq!(stored.actor, Actor::user(1));
        assert_eq!(stored.reasoning, vec!["Popular right now".to_string()]);
        assert!(!stored.was_clicked && !stored.was_purchased);
    }

    #[rstest]
    #[case(1.7, 1.0)]
    #[case(-0.2, 0.0)]
    #[case(f64::NAN, 0.0)]
    fn test_insert_clamps_scores(#[case] score: f64, #[case] stored: f64) {
        let (_file, storage) = storage();
        storage
            .insert_batch(&[row(Actor::session("s"), 1, RecommendationType::Similar, score)])
            .unwrap();
        let listed = storage.list(&RecommendationQuery::default()).unwrap();
        assert_eq!(listed[0].score, stored);
    }

    #[test]
    fn test_mark_clicked_reports_changed_rows() {
        let (_file, storage) = storage();
        storage
            .insert_batch(&[row(Actor::user(1), 3, RecommendationType::Trending, 0.5)])
            .unwrap();
        let id = storage.list(&RecommendationQuery::default()).unwrap()[0].id;

        assert_eq!(storage.mark_clicked(id, Utc::now()).unwrap(), 1);
        assert!(storage.get(id).unwrap().unwrap().was_clicked);
        assert_eq!(storage.mark_clicked(id + 100, Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_mark_purchased_matches_product_and_actor() {
        let (_file, storage) = storage();
        storage
            .insert_batch(&[
                row(Actor::user(1), 3, RecommendationType::Trending, 0.5),
                row(Actor::user(1), 3, RecommendationType::Collaborative, 0.4),
                row(Actor::user(2), 3, RecommendationType::Trending, 0.5),
                row(Actor::user(1), 4, RecommendationType::Trending, 0.5),
            ])
            .unwrap();

        assert_eq!(storage.mark_purchased(3, &Actor::user(1), Utc::now()).unwrap(), 2);
        assert_eq!(storage.mark_purchased(3, &Actor::session("x"), Utc::now()).unwrap(), 0);

        let purchased = storage
            .list(&RecommendationQuery::default())
            .unwrap()
            .into_iter()
            .filter(|r| r.was_purchased)
            .count();
        assert_eq!(purchased, 2);
    }

    #[test]
    fn test_list_filters() {
        let (_file, storage) = storage();
        storage
            .insert_batch(&[
                row(Actor::user(1), 1, RecommendationType::Trending, 0.2),
                row(Actor::user(1), 2, RecommendationType::Trending, 0.9),
                row(Actor::user(1), 3, RecommendationType::ContentBased, 0.5),
                row(Actor::user(2), 4, RecommendationType::Trending, 0.8),
            ])
            .unwrap();

        let listed = storage
            .list(&RecommendationQuery {
                actor: Some(Actor::user(1)),
                kind: Some(RecommendationType::Trending),
                min_score: Some(0.1),
                limit: Some(5),
            })
            .unwrap();
        let products: Vec<i64> = listed.iter().map(|r| r.product_id).collect();
        assert_eq!(products, vec![2, 1]);
    }

    #[test]
    fn test_performance_rates() {
        let (_file, storage) = storage();
        storage
            .insert_batch(&[
                row(Actor::user(1), 1, RecommendationType::Trending, 0.2),
                row(Actor::user(1), 2, RecommendationType::Trending, 0.9),
            ])
            .unwrap();
        let id = storage.list(&RecommendationQuery::default()).unwrap()[0].id;
        storage.mark_clicked(id, Utc::now()).unwrap();

        let stats = storage.performance().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].kind, RecommendationType::Trending);
        assert_eq!(stats[0].shown, 2);
        assert_eq!(stats[0].click_through_rate(), 0.5);
        assert_eq!(stats[0].conversion_rate(), 0.0);
    }
}
