// Storage schema and database management

use crate::error::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path
    pub db_path: String,

    /// Whether to enable WAL mode
    pub wal_enabled: bool,

    /// Cache size in pages
    pub cache_size_pages: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "leconseil.db".to_string(),
            wal_enabled: true,
            cache_size_pages: Some(10000),
        }
    }
}

/// Main storage interface
///
/// Owns a single SQLite connection and implements every store contract of
/// the crate. Open one `Storage` per worker against the same database file
/// for concurrent readers.
pub struct Storage {
    conn: Connection,
    config: StorageConfig,
}

impl Storage {
    /// Open storage with default config
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, StorageConfig::default())
    }

    /// Open storage with custom config
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: StorageConfig) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets several connections read while one writes
        if config.wal_enabled {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        }

        if let Some(cache_size) = config.cache_size_pages {
            conn.pragma_update(None, "cache_size", cache_size)?;
        }

        let storage = Self { conn, config };
        storage.initialize_schema()?;

        tracing::debug!(wal = storage.config.wal_enabled, "storage opened");
        Ok(storage)
    }

    /// Initialize database schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL CHECK (price >= 0),
                category TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                image_url TEXT,
                stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
                is_active INTEGER NOT NULL DEFAULT 1,
                avg_rating REAL NOT NULL DEFAULT 0 CHECK (avg_rating >= 0 AND avg_rating <= 5),
                total_reviews INTEGER NOT NULL DEFAULT 0 CHECK (total_reviews >= 0),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Interactions are append-only; exactly one actor column is set
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS user_interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                session_id TEXT,
                product_id INTEGER NOT NULL,
                interaction_type TEXT NOT NULL CHECK (interaction_type IN
                    ('view', 'click', 'add_to_cart', 'purchase', 'wishlist', 'rating')),
                metadata TEXT,
                value REAL,
                created_at INTEGER NOT NULL,
                CHECK ((user_id IS NULL) <> (session_id IS NULL))
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                session_id TEXT,
                product_id INTEGER NOT NULL,
                recommendation_type TEXT NOT NULL CHECK (recommendation_type IN
                    ('collaborative', 'content_based', 'trending', 'similar', 'ai_generated')),
                score REAL NOT NULL CHECK (score >= 0 AND score <= 1),
                reasoning TEXT NOT NULL DEFAULT '[]',
                was_clicked INTEGER NOT NULL DEFAULT 0,
                was_purchased INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                CHECK ((user_id IS NULL) <> (session_id IS NULL))
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS analytics_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                session_id TEXT,
                event_name TEXT NOT NULL,
                event_data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                CHECK (user_id IS NULL OR session_id IS NULL)
            )",
            [],
        )?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_products_category_active
                ON products(category, is_active)",
            "CREATE INDEX IF NOT EXISTS idx_products_rating ON products(avg_rating)",
            "CREATE INDEX IF NOT EXISTS idx_interactions_user_type
                ON user_interactions(user_id, interaction_type)",
            "CREATE INDEX IF NOT EXISTS idx_interactions_session_type
                ON user_interactions(session_id, interaction_type)",
            "CREATE INDEX IF NOT EXISTS idx_interactions_product_type
                ON user_interactions(product_id, interaction_type)",
            "CREATE INDEX IF NOT EXISTS idx_interactions_created ON user_interactions(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_recommendations_user_score
                ON recommendations(user_id, score)",
            "CREATE INDEX IF NOT EXISTS idx_recommendations_session_score
                ON recommendations(session_id, score)",
            "CREATE INDEX IF NOT EXISTS idx_recommendations_type
                ON recommendations(recommendation_type)",
            "CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at)",
            "CREATE INDEX IF NOT EXISTS idx_events_name_created
                ON analytics_events(event_name, created_at)",
        ];
        for index_sql in indexes {
            self.conn.execute(index_sql, [])?;
        }

        Ok(())
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Get the active configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Checkpoint the WAL so file locks are released before the handle is dropped
    pub fn close(&mut self) -> Result<()> {
        if self.config.wal_enabled {
            self.conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_storage_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path());
        assert!(storage.is_ok());
    }

    #[test]
    fn test_schema_initialization() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();

        let table_count: i64 = storage
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                    ('products', 'user_interactions', 'recommendations',
                     'cache_entries', 'analytics_events')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 5);
    }

    #[test]
    fn test_schema_is_reopenable() {
        let temp_file = NamedTempFile::new().unwrap();
        drop(Storage::open(temp_file.path()).unwrap());
        assert!(Storage::open(temp_file.path()).is_ok());
    }

    #[test]
    fn test_actor_check_constraint() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();

        let both = storage.conn().execute(
            "INSERT INTO user_interactions
                 (user_id, session_id, product_id, interaction_type, created_at)
             VALUES (1, 's', 1, 'view', 0)",
            [],
        );
        assert!(both.is_err());

        let neither = storage.conn().execute(
            "INSERT INTO user_interactions
                 (user_id, session_id, product_id, interaction_type, created_at)
             VALUES (NULL, NULL, 1, 'view', 0)",
            [],
        );
        assert!(neither.is_err());
    }
}
