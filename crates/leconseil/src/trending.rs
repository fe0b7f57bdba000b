// Trending products from recent interaction volume

use crate::cache::{remember, CacheOutcome};
use crate::candidate::{Candidate, CandidateSource};
use crate::clock::Clock;
use crate::config::TrendingSettings;
use crate::error::{ConseilError, Result};
use lestockage::{
    Actor, CacheStore, InteractionStore, InteractionType, ProductCountQuery, RecommendationType,
};
use tracing::debug;

const TRENDING_KINDS: [InteractionType; 3] = [
    InteractionType::View,
    InteractionType::Purchase,
    InteractionType::AddToCart,
];

/// Reasoning attached to every trending candidate
pub const TRENDING_REASON: &str = "Currently trending and popular";

/// Cache key for a trending list of a given length
pub fn trending_cache_key(limit: usize) -> String {
    format!("trending_products_{}", limit)
}

/// Recommends globally popular products. Ignores the actor.
pub struct TrendScorer<'a> {
    interactions: &'a dyn InteractionStore,
    cache: &'a dyn CacheStore,
    clock: &'a dyn Clock,
    settings: TrendingSettings,
}

impl<'a> TrendScorer<'a> {
    /// Create a scorer with its cache and clock
    pub fn new(
        interactions: &'a dyn InteractionStore,
        cache: &'a dyn CacheStore,
        clock: &'a dyn Clock,
        settings: TrendingSettings,
    ) -> Self {
        Self {
            interactions,
            cache,
            clock,
            settings,
        }
    }

    /// Trending list of at most `limit` products, memoised for the configured TTL
    pub fn trending(&self, limit: usize) -> Result<(Vec<Candidate>, CacheOutcome)> {
        if limit == 0 {
            return Ok((Vec::new(), CacheOutcome::Bypassed));
        }
        if !self.settings.cache_enabled {
            return Ok((self.compute(limit)?, CacheOutcome::Bypassed));
        }

        let now = self.clock.now();
        remember(
            self.cache,
            &trending_cache_key(limit),
            self.settings.cache_ttl()?,
            now,
            || self.compute(limit),
        )
    }

    /// Count recent interactions per product, bypassing the cache
    pub fn compute(&self, limit: usize) -> Result<Vec<Candidate>> {
        let now = self.clock.now();
        let since = now.checked_sub_signed(self.settings.window()?).ok_or_else(|| {
            ConseilError::config_error(
                format!(
                    "trending.window_days {} reaches before the earliest timestamp",
                    self.settings.window_days
                ),
                None,
            )
        })?;
        let counts = self.interactions.count_by_product(&ProductCountQuery {
            actors: None,
            kinds: TRENDING_KINDS.to_vec(),
            since: Some(since),
        })?;

        let candidates: Vec<Candidate> = counts
            .into_iter()
            .take(limit)
            .map(|c| {
                Candidate::new(
                    c.product_id,
                    RecommendationType::Trending,
                    c.count as f64 / self.settings.score_divisor,
                    vec![TRENDING_REASON.to_string()],
                )
            })
            .collect();

        debug!(limit, candidates = candidates.len(), "trending computed");
        Ok(candidates)
    }
}

impl CandidateSource for TrendScorer<'_> {
    fn kind(&self) -> RecommendationType {
        RecommendationType::Trending
    }

    fn candidates(&self, _actor: &Actor, limit: usize) -> Result<Vec<Candidate>> {
        self.trending(limit).map(|(candidates, _)| candidates)
    }
}
