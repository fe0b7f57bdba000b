// Cache-aside memoisation over a CacheStore

use crate::error::{ConseilError, Result};
use chrono::{DateTime, Duration, Utc};
use lestockage::CacheStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Where a remembered value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Decoded from a live entry
    Hit,
    /// Computed and stored
    Miss,
    /// Computed; the cache could not be used
    Bypassed,
}

/// Return the value cached under `key`, or compute and store it for `ttl`.
///
/// The cache never fails the call. Read errors, write errors and stored
/// values that no longer decode are logged at `warn` and the value is
/// computed directly. Errors from `compute` itself propagate, as does a
/// `ttl` that would push the expiry past the representable range.
pub fn remember<T, F>(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    now: DateTime<Utc>,
    compute: F,
) -> Result<(T, CacheOutcome)>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
        ConseilError::config_error(format!("cache ttl {} overflows the expiry time", ttl), None)
    })?;

    let mut cache_usable = true;
    match cache.get(key, now) {
        Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                return Ok((value, CacheOutcome::Hit));
            }
            Err(e) => warn!(key, error = %e, "discarding undecodable cache entry"),
        },
        Ok(None) => debug!(key, "cache miss"),
        Err(e) => {
            warn!(key, error = %e, "cache read failed, computing directly");
            cache_usable = false;
        }
    }

    let value = compute()?;

    let stored = serde_json::to_string(&value)
        .map_err(lestockage::StorageError::from)
        .and_then(|raw| cache.put(key, &raw, expires_at));
    if let Err(e) = stored {
        warn!(key, error = %e, "cache write failed");
        cache_usable = false;
    }

    let outcome = if cache_usable {
        CacheOutcome::Miss
    } else {
        CacheOutcome::Bypassed
    };
    Ok((value, outcome))
}
