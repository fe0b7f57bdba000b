// Key-value cache with absolute expiry

use crate::error::Result;
use crate::schema::Storage;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

/// String cache keyed by name.
///
/// Entries carry an absolute expiry. An entry whose expiry is at or before
/// the lookup instant is a miss, whether or not it has been purged yet.
pub trait CacheStore {
    /// Value stored under `key`, unless it expired at or before `now`
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous entry
    fn put(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Delete entries that expired at or before `now`
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Delete every entry
    fn clear(&self) -> Result<usize>;
}

impl CacheStore for Storage {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM cache_entries WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now.timestamp()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO cache_entries (cache_key, value, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(cache_key) DO UPDATE SET
                     value = excluded.value,
                     expires_at = excluded.expires_at",
            params![key, value, expires_at.timestamp()],
        )?;
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now.timestamp()],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "expired cache entries purged");
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<usize> {
        let removed = self.conn().execute("DELETE FROM cache_entries", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    fn storage() -> (NamedTempFile, Storage) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        (temp_file, storage)
    }

    #[test]
    fn test_put_then_get_until_expiry() {
        let (_file, storage) = storage();
        let now = Utc::now();
        storage.put("k", "[1,2]", now + Duration::seconds(60)).unwrap();

        assert_eq!(storage.get("k", now).unwrap().as_deref(), Some("[1,2]"));
        assert_eq!(
            storage.get("k", now + Duration::seconds(59)).unwrap().as_deref(),
            Some("[1,2]")
        );
        assert_eq!(storage.get("k", now + Duration::seconds(60)).unwrap(), None);
        assert_eq!(storage.get("missing", now).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let (_file, storage) = storage();
        let later = Utc::now() + Duration::hours(1);
        storage.put("k", "old", later).unwrap();
        storage.put("k", "new", later).unwrap();
        assert_eq!(storage.get("k", Utc::now()).unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_row_holds_only_caller_timestamps() {
        let (_file, storage) = storage();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        storage.put("k", "v", at).unwrap();

        let columns: Vec<String> = storage
            .conn()
            .prepare("SELECT name FROM pragma_table_info('cache_entries') ORDER BY cid")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(columns, vec!["cache_key", "value", "expires_at"]);

        let expires_at: i64 = storage
            .conn()
            .query_row("SELECT expires_at FROM cache_entries WHERE cache_key = 'k'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(expires_at, 1_700_000_000);
    }

    #[test]
    fn test_purge_and_clear() {
        let (_file, storage) = storage();
        let now = Utc::now();
        storage.put("stale", "1", now - Duration::seconds(1)).unwrap();
        storage.put("fresh", "2", now + Duration::hours(1)).unwrap();

        assert_eq!(storage.purge_expired(now).unwrap(), 1);
        assert_eq!(storage.clear().unwrap(), 1);
        assert_eq!(storage.get("fresh", now).unwrap(), None);
    }
}
