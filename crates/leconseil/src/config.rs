// Engine Configuration
//
// *La Configuration* (The Configuration) - Tunable constants for every scorer

use crate::error::{ConseilError, Result};
use chrono::Duration;
use lestockage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Directory holding the configuration file
pub const CONFIG_DIR: &str = ".leconseil";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = ".leconseil/config.toml";

/// Environment override for the database path
pub const ENV_DB_PATH: &str = "LECONSEIL_DB_PATH";

/// Environment override for the log level
pub const ENV_LOG_LEVEL: &str = "LECONSEIL_LOG_LEVEL";

/// Environment override for the failure policy
pub const ENV_FAILURE_POLICY: &str = "LECONSEIL_FAILURE_POLICY";

/// Longest trending look-back window, in days
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Longest trending cache lifetime, in seconds
pub const MAX_CACHE_TTL_SECS: i64 = MAX_WINDOW_DAYS * 86_400;

/// How the aggregator reacts when one scorer cannot read its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole call with the first error
    #[default]
    Strict,
    /// Log the failing scorer and merge the others
    Isolate,
}

impl FailurePolicy {
    /// Return the string representation of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Strict => "strict",
            FailurePolicy::Isolate => "isolate",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = ConseilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(FailurePolicy::Strict),
            "isolate" => Ok(FailurePolicy::Isolate),
            other => Err(ConseilError::config_error(
                format!("unknown failure policy '{}'", other),
                Some("Use 'strict' or 'isolate'.".to_string()),
            )),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Collaborative filtering settings
    pub collaborative: CollaborativeSettings,

    /// Content-based filtering settings
    pub content: ContentSettings,

    /// Trending settings
    pub trending: TrendingSettings,

    /// Product-to-product similarity settings
    pub similar: SimilarSettings,

    /// Merge and persistence settings
    pub aggregation: AggregationSettings,

    /// Logging settings
    pub logging: LoggingSettings,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load configuration from a directory
    ///
    /// Looks for `.leconseil/config.toml` under `dir`. A missing file yields
    /// the defaults. The result is validated before it is returned.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_FILE);
        if !config_path.exists() {
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ConseilError::io_error("Failed to read config file", &config_path, e))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConseilError::config_error(
                format!("Failed to parse config: {}", e),
                Some(format!("Check the syntax of {}", DEFAULT_CONFIG_FILE)),
            )
        })
    }

    /// Save configuration under a directory, creating `.leconseil` if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let config_dir = dir.as_ref().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).map_err(|e| {
            ConseilError::io_error("Failed to create config directory", &config_dir, e)
        })?;

        let config_path = config_dir.join("config.toml");
        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            ConseilError::config_error(format!("Failed to serialize configuration: {}", e), None)
        })?;

        fs::write(&config_path, toml_string)
            .map_err(|e| ConseilError::io_error("Failed to write config file", &config_path, e))?;
        Ok(())
    }

    /// Apply `LECONSEIL_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.storage.db_path = path;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        if let Some(policy) = lookup(ENV_FAILURE_POLICY) {
            self.aggregation.failure_policy = policy.parse()?;
        }
        self.validate()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("collaborative.score_divisor", self.collaborative.score_divisor),
            ("content.score_divisor", self.content.score_divisor),
            ("trending.score_divisor", self.trending.score_divisor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConseilError::config_error(
                    format!("{} must be a positive number, got {}", name, value),
                    Some("Scores are divided by this value before clamping.".to_string()),
                ));
            }
        }

        let weights = [
            ("content.category_weight", self.content.category_weight),
            ("content.tag_weight", self.content.tag_weight),
            ("content.rating_weight", self.content.rating_weight),
            ("similar.tag_weight", self.similar.tag_weight),
            ("similar.price_weight", self.similar.price_weight),
            ("similar.rating_weight", self.similar.rating_weight),
            ("similar.review_weight", self.similar.review_weight),
        ];
        for (name, value) in weights {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConseilError::config_error(
                    format!("{} must be a non-negative number, got {}", name, value),
                    None,
                ));
            }
        }

        if self.collaborative.neighbour_limit == 0 {
            return Err(ConseilError::config_error(
                "collaborative.neighbour_limit must be at least 1",
                None,
            ));
        }
        if self.content.history_window == 0 {
            return Err(ConseilError::config_error(
                "content.history_window must be at least 1",
                None,
            ));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.trending.window_days) {
            return Err(ConseilError::config_error(
                format!(
                    "trending.window_days must be between 1 and {}, got {}",
                    MAX_WINDOW_DAYS, self.trending.window_days
                ),
                Some("Set window_days to 1 or more.".to_string()),
            ));
        }
        if !(1..=MAX_CACHE_TTL_SECS).contains(&self.trending.cache_ttl_secs) {
            return Err(ConseilError::config_error(
                format!(
                    "trending.cache_ttl_secs must be between 1 and {}, got {}",
                    MAX_CACHE_TTL_SECS, self.trending.cache_ttl_secs
                ),
                Some("Disable caching with trending.cache_enabled = false instead.".to_string()),
            ));
        }
        if self.storage.db_path.trim().is_empty() {
            return Err(ConseilError::config_error(
                "storage.db_path cannot be empty",
                Some(format!("Set it in {} or via {}", DEFAULT_CONFIG_FILE, ENV_DB_PATH)),
            ));
        }

        Ok(())
    }
}

/// Collaborative filtering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborativeSettings {
    /// Number of similar actors consulted
    pub neighbour_limit: usize,
    /// Actors need strictly more shared interactions than this
    pub min_co_occurrence: u64,
    /// Interaction count mapped to a score of 1.0
    pub score_divisor: f64,
}

impl Default for CollaborativeSettings {
    fn default() -> Self {
        Self {
            neighbour_limit: 20,
            min_co_occurrence: 1,
            score_divisor: 10.0,
        }
    }
}

/// Content-based filtering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Recent interactions used to build the preference profile
    pub history_window: usize,
    /// Weight per matching category occurrence
    pub category_weight: f64,
    /// Weight per matching tag occurrence
    pub tag_weight: f64,
    /// Weight per rating star
    pub rating_weight: f64,
    /// Raw score mapped to 1.0
    pub score_divisor: f64,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            category_weight: 0.3,
            tag_weight: 0.2,
            rating_weight: 0.1,
            score_divisor: 10.0,
        }
    }
}

/// Trending settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendingSettings {
    /// Look-back window
    pub window_days: i64,
    /// Interaction count mapped to a score of 1.0
    pub score_divisor: f64,
    /// Lifetime of a cached trending list
    pub cache_ttl_secs: i64,
    /// Whether to memoise trending lists in the cache store
    pub cache_enabled: bool,
}

impl TrendingSettings {
    /// Look-back window as a duration
    pub fn window(&self) -> Result<Duration> {
        Duration::try_days(self.window_days).ok_or_else(|| {
            ConseilError::config_error(
                format!("trending.window_days {} is out of range", self.window_days),
                None,
            )
        })
    }

    /// Cache lifetime as a duration
    pub fn cache_ttl(&self) -> Result<Duration> {
        Duration::try_seconds(self.cache_ttl_secs).ok_or_else(|| {
            ConseilError::config_error(
                format!("trending.cache_ttl_secs {} is out of range", self.cache_ttl_secs),
                None,
            )
        })
    }
}

impl Default for TrendingSettings {
    fn default() -> Self {
        Self {
            window_days: 7,
            score_divisor: 100.0,
            cache_ttl_secs: 3600,
            cache_enabled: true,
        }
    }
}

/// Product similarity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarSettings {
    /// Results when the caller gives no limit
    pub default_limit: usize,
    /// Weight per shared tag
    pub tag_weight: f64,
    /// Weight of price closeness
    pub price_weight: f64,
    /// Weight of rating closeness
    pub rating_weight: f64,
    /// Weight per review of the candidate
    pub review_weight: f64,
}

impl Default for SimilarSettings {
    fn default() -> Self {
        Self {
            default_limit: 6,
            tag_weight: 0.3,
            price_weight: 0.2,
            rating_weight: 0.3,
            review_weight: 0.001,
        }
    }
}

/// Merge and persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Results when the caller gives no limit
    pub default_limit: usize,
    /// Reaction to scorer read failures
    pub failure_policy: FailurePolicy,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            failure_policy: FailurePolicy::Strict,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
