//! lestockage - Persistent Storage Layer
//!
//! *Le Stockage* (The Storage) - SQLite schema and store contracts for the
//! catalog, the interaction log, persisted recommendations, the expiring
//! cache and analytics events.
//!
//! Every contract is a trait implemented by [`Storage`], so the engine can
//! run against the shop database or against in-memory fakes.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Analytics event sink.
pub mod analytics;
/// Expiring key-value cache.
pub mod cache;
/// Product catalog reads and upserts.
pub mod catalog;
/// Storage error types.
pub mod error;
/// Interaction log and grouped counts.
pub mod interactions;
/// Persisted recommendations and feedback flags.
pub mod recommendations;
/// Record types shared by every store.
pub mod records;
/// Database schema and connection management.
pub mod schema;

pub use analytics::{EventCount, EventSink};
pub use cache::CacheStore;
pub use catalog::{CatalogStore, ProductEngagement};
pub use error::{Result, StorageError};
pub use interactions::{ActorCount, HistoryQuery, InteractionStore, ProductCount, ProductCountQuery};
pub use recommendations::{FeedbackStats, RecommendationQuery, RecommendationStore};
pub use records::{
    round_to, Actor, Interaction, InteractionType, JsonMap, NewInteraction, NewRecommendation,
    Product, RecommendationRecord, RecommendationType, TrackedEvent,
};
pub use schema::{Storage, StorageConfig};

/// Storage library initialization
pub fn init() {
    let _ = tracing::subscriber::set_default(tracing::subscriber::NoSubscriber::default());
}
