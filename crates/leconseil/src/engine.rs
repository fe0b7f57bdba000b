// Recommendation Engine
//
// *Le Moteur* (The Engine) - Runs the scorers, merges their output and persists it

use crate::affinity::AffinityScorer;
use crate::candidate::{merge_candidates, Candidate, CandidateSource};
use crate::clock::{Clock, SystemClock};
use crate::collaborative::CollaborativeScorer;
use crate::config::{EngineConfig, FailurePolicy};
use crate::error::Result;
use crate::feedback::FeedbackRecorder;
use crate::similar::ProductSimilarityScorer;
use crate::trending::TrendScorer;
use lestockage::{
    Actor, CacheStore, CatalogStore, EventSink, InteractionStore, NewRecommendation,
    RecommendationStore, RecommendationType, Storage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The store collaborators the engine reads and writes.
#[derive(Clone, Copy)]
pub struct Stores<'a> {
    /// Interaction log
    pub interactions: &'a dyn InteractionStore,
    /// Product catalog
    pub catalog: &'a dyn CatalogStore,
    /// Persisted recommendations
    pub recommendations: &'a dyn RecommendationStore,
    /// Memoisation cache
    pub cache: &'a dyn CacheStore,
    /// Analytics sink
    pub events: &'a dyn EventSink,
}

impl<'a> Stores<'a> {
    /// Every contract served by one SQLite database
    pub fn from_storage(storage: &'a Storage) -> Self {
        Self {
            interactions: storage,
            catalog: storage,
            recommendations: storage,
            cache: storage,
            events: storage,
        }
    }
}

/// Candidates one scorer contributed before merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    /// Scorer
    pub kind: RecommendationType,
    /// Candidates it produced
    pub candidates: usize,
}

/// Outcome of one generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Merged, ranked list that was persisted
    pub recommendations: Vec<Candidate>,
    /// Candidate counts per scorer, in merge order
    pub per_source: Vec<SourceCount>,
    /// Scorers skipped under the isolate policy
    pub failed_sources: Vec<RecommendationType>,
    /// Rows written to the recommendation store
    pub persisted_rows: usize,
}

/// Recommendation engine over a set of stores.
pub struct RecommendationEngine<'a> {
    stores: Stores<'a>,
    config: EngineConfig,
    clock: &'a dyn Clock,
}

impl<'a> RecommendationEngine<'a> {
    /// Create an engine using the wall clock
    pub fn new(stores: Stores<'a>, config: EngineConfig) -> Self {
        Self::with_clock(stores, config, &SystemClock)
    }

    /// Create an engine with an explicit time source
    pub fn with_clock(stores: Stores<'a>, config: EngineConfig, clock: &'a dyn Clock) -> Self {
        Self {
            stores,
            config,
            clock,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Collaborative scorer bound to this engine's stores
    pub fn collaborative(&self) -> CollaborativeScorer<'a> {
        CollaborativeScorer::new(self.stores.interactions, self.config.collaborative.clone())
    }

    /// Content-based scorer bound to this engine's stores
    pub fn affinity(&self) -> AffinityScorer<'a> {
        AffinityScorer::new(
            self.stores.interactions,
            self.stores.catalog,
            self.config.content.clone(),
        )
    }

    /// Trend scorer bound to this engine's stores
    pub fn trending(&self) -> TrendScorer<'a> {
        TrendScorer::new(
            self.stores.interactions,
            self.stores.cache,
            self.clock,
            self.config.trending.clone(),
        )
    }

    /// Feedback recorder bound to this engine's stores
    pub fn feedback(&self) -> FeedbackRecorder<'a> {
        FeedbackRecorder::new(self.stores.recommendations, self.stores.events, self.clock)
    }

    /// Ranked, deduplicated recommendations for `actor`, persisted before returning
    pub fn generate_recommendations(&self, actor: &Actor, limit: usize) -> Result<Vec<Candidate>> {
        Ok(self.generate_report(actor, limit)?.recommendations)
    }

    /// Same as [`generate_recommendations`](Self::generate_recommendations), with per-scorer detail
    pub fn generate_report(&self, actor: &Actor, limit: usize) -> Result<GenerationReport> {
        if limit == 0 {
            return Ok(GenerationReport::default());
        }

        let collaborative = self.collaborative();
        let affinity = self.affinity();
        let trending = self.trending();
        let sources: [&dyn CandidateSource; 3] = [&collaborative, &affinity, &trending];

        let mut report = GenerationReport::default();
        let mut lists = Vec::with_capacity(sources.len());
        for source in sources {
            let candidates = match source.candidates(actor, limit) {
                Ok(candidates) => candidates,
                Err(e) => match self.config.aggregation.failure_policy {
                    FailurePolicy::Strict => return Err(e),
                    FailurePolicy::Isolate => {
                        warn!(
                            source = %source.kind(),
                            %actor,
                            error = %e,
                            "scorer failed, skipping"
                        );
                        report.failed_sources.push(source.kind());
                        Vec::new()
                    }
                },
            };
            report.per_source.push(SourceCount {
                kind: source.kind(),
                candidates: candidates.len(),
            });
            lists.push(candidates);
        }

        report.recommendations = merge_candidates(lists, limit);
        report.persisted_rows = self.persist(actor, &report.recommendations)?;

        info!(
            %actor,
            limit,
            returned = report.recommendations.len(),
            failed = report.failed_sources.len(),
            "recommendations generated"
        );
        Ok(report)
    }

    /// Products similar to `product_id`; `None` uses the configured default limit.
    ///
    /// Results are returned, not persisted.
    pub fn similar_products(
        &self,
        product_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Candidate>> {
        let limit = limit.unwrap_or(self.config.similar.default_limit);
        ProductSimilarityScorer::new(self.stores.catalog, self.config.similar.clone())
            .similar_to(product_id, limit)
    }

    fn persist(&self, actor: &Actor, candidates: &[Candidate]) -> Result<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        let rows: Vec<NewRecommendation> = candidates
            .iter()
            .map(|c| NewRecommendation {
                actor: actor.clone(),
                product_id: c.product_id,
                kind: c.kind,
                score: c.score,
                reasoning: c.reasoning.clone(),
                created_at: now,
            })
            .collect();

        Ok(self.stores.recommendations.insert_batch(&rows)?)
    }
}
