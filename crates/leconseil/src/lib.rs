//! leconseil - Recommendation Engine
//!
//! *Le Conseil* (The Advice) - Blends collaborative filtering, content
//! affinity and trending popularity into one ranked, deduplicated list of
//! product recommendations, persists it, and records click and purchase
//! feedback against it.
//!
//! ```no_run
//! use leconseil::{EngineConfig, RecommendationEngine, Stores};
//! use lestockage::{Actor, Storage};
//!
//! # fn main() -> leconseil::Result<()> {
//! let storage = Storage::open("shop.db")?;
//! let engine = RecommendationEngine::new(Stores::from_storage(&storage), EngineConfig::default());
//! for rec in engine.generate_recommendations(&Actor::user(42), 10)? {
//!     println!("{} {:.4} {:?}", rec.product_id, rec.score, rec.reasoning);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Content-based scoring.
pub mod affinity;
/// Cache-aside memoisation.
pub mod cache;
/// Candidates and the merge step.
pub mod candidate;
/// Time sources.
pub mod clock;
/// Collaborative scoring.
pub mod collaborative;
/// Engine configuration.
pub mod config;
/// Aggregation and persistence.
pub mod engine;
/// Engine error types.
pub mod error;
/// Click and purchase attribution.
pub mod feedback;
/// Product-to-product similarity.
pub mod similar;
/// Trending scoring.
pub mod trending;

/// Command-line interface.
#[cfg(feature = "cli")]
pub mod cli;

pub use cache::{remember, CacheOutcome};
pub use candidate::{clamp_score, merge_candidates, Candidate, CandidateSource};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, FailurePolicy};
pub use engine::{GenerationReport, RecommendationEngine, SourceCount, Stores};
pub use error::{ConseilError, Result};
pub use feedback::FeedbackRecorder;

/// Engine library initialization
pub fn init() {
    let _ = tracing::subscriber::set_default(tracing::subscriber::NoSubscriber::default());
}
