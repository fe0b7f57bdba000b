// Record types shared by every store

use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON object stored alongside interactions and tracked events.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Identity driving interactions and recommendations.
///
/// Exactly one of a user id or a session id. The SQLite tables keep the two
/// nullable columns of the shop schema and guard them with a `CHECK`
/// constraint; [`Actor::from_columns`] rejects rows that slip past it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Authenticated user
    User(i64),
    /// Anonymous browsing session
    Session(String),
}

impl Actor {
    /// Authenticated user actor
    pub fn user(id: i64) -> Self {
        Actor::User(id)
    }

    /// Anonymous session actor
    pub fn session(id: impl Into<String>) -> Self {
        Actor::Session(id.into())
    }

    /// User id, if this is a user actor
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::Session(_) => None,
        }
    }

    /// Session id, if this is a session actor
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Actor::User(_) => None,
            Actor::Session(id) => Some(id.as_str()),
        }
    }

    /// Rebuild an actor from the `(user_id, session_id)` column pair.
    pub fn from_columns(user_id: Option<i64>, session_id: Option<String>) -> Result<Self> {
        match (user_id, session_id) {
            (Some(id), None) => Ok(Actor::User(id)),
            (None, Some(id)) => Ok(Actor::Session(id)),
            (Some(user), Some(session)) => Err(StorageError::invalid(format!(
                "actor has both user_id {} and session_id {}",
                user, session
            ))),
            (None, None) => Err(StorageError::invalid(
                "actor has neither user_id nor session_id",
            )),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::Session(id) => write!(f, "session:{}", id),
        }
    }
}

/// Interaction type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Product page view
    View,
    /// Click on a product link
    Click,
    /// Product added to the cart
    AddToCart,
    /// Completed purchase
    Purchase,
    /// Product added to a wishlist
    Wishlist,
    /// Product rated by the actor
    Rating,
}

impl InteractionType {
    /// Every interaction type, in schema order
    pub const ALL: [InteractionType; 6] = [
        InteractionType::View,
        InteractionType::Click,
        InteractionType::AddToCart,
        InteractionType::Purchase,
        InteractionType::Wishlist,
        InteractionType::Rating,
    ];

    /// Return the string representation of the interaction type.
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Click => "click",
            InteractionType::AddToCart => "add_to_cart",
            InteractionType::Purchase => "purchase",
            InteractionType::Wishlist => "wishlist",
            InteractionType::Rating => "rating",
        }
    }

    /// Create an interaction type from its string representation.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "view" => Some(InteractionType::View),
            "click" => Some(InteractionType::Click),
            "add_to_cart" => Some(InteractionType::AddToCart),
            "purchase" => Some(InteractionType::Purchase),
            "wishlist" => Some(InteractionType::Wishlist),
            "rating" => Some(InteractionType::Rating),
            _ => None,
        }
    }
}

/// Recommendation type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    /// Behaviour similarity across actors
    Collaborative,
    /// Category and tag affinity with the actor's history
    ContentBased,
    /// Recent global popularity
    Trending,
    /// Pairwise product similarity
    Similar,
    /// Produced by an external generator
    AiGenerated,
}

impl RecommendationType {
    /// Every recommendation type, in schema order
    pub const ALL: [RecommendationType; 5] = [
        RecommendationType::Collaborative,
        RecommendationType::ContentBased,
        RecommendationType::Trending,
        RecommendationType::Similar,
        RecommendationType::AiGenerated,
    ];

    /// Return the string representation of the recommendation type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::Collaborative => "collaborative",
            RecommendationType::ContentBased => "content_based",
            RecommendationType::Trending => "trending",
            RecommendationType::Similar => "similar",
            RecommendationType::AiGenerated => "ai_generated",
        }
    }

    /// Create a recommendation type from its string representation.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "collaborative" => Some(RecommendationType::Collaborative),
            "content_based" => Some(RecommendationType::ContentBased),
            "trending" => Some(RecommendationType::Trending),
            "similar" => Some(RecommendationType::Similar),
            "ai_generated" => Some(RecommendationType::AiGenerated),
            _ => None,
        }
    }
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored interaction (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Database ID
    pub id: i64,
    /// Who interacted
    pub actor: Actor,
    /// Product interacted with
    pub product_id: i64,
    /// Kind of interaction
    pub kind: InteractionType,
    /// Free-form context
    pub metadata: Option<JsonMap>,
    /// Amount for purchases, stars for ratings
    pub value: Option<f64>,
    /// When it happened
    pub created_at: DateTime<Utc>,
}

/// Interaction to append to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInteraction {
    /// Who interacted
    pub actor: Actor,
    /// Product interacted with
    pub product_id: i64,
    /// Kind of interaction
    pub kind: InteractionType,
    /// Free-form context
    pub metadata: Option<JsonMap>,
    /// Amount for purchases, stars for ratings
    pub value: Option<f64>,
    /// When it happened
    pub created_at: DateTime<Utc>,
}

impl NewInteraction {
    /// Interaction happening now
    pub fn new(actor: Actor, product_id: i64, kind: InteractionType) -> Self {
        Self {
            actor,
            product_id,
            kind,
            metadata: None,
            value: None,
            created_at: Utc::now(),
        }
    }

    /// Set the timestamp
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attach a numeric value
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Long description
    pub description: String,
    /// Unit price, two decimal places
    pub price: f64,
    /// Category name
    pub category: String,
    /// Tags, unique and in insertion order
    pub tags: Vec<String>,
    /// Image location
    pub image_url: Option<String>,
    /// Units in stock
    pub stock: i64,
    /// Whether the product is listed
    pub is_active: bool,
    /// Average rating in `[0, 5]`, two decimal places
    pub avg_rating: f64,
    /// Number of reviews behind the rating
    pub total_reviews: i64,
}

impl Product {
    /// Active product with no stock, tags or reviews
    pub fn new(id: i64, name: impl Into<String>, category: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            price,
            category: category.into(),
            tags: Vec::new(),
            image_url: None,
            stock: 0,
            is_active: true,
            avg_rating: 0.0,
            total_reviews: 0,
        }
    }

    /// Replace tags, dropping blanks and duplicates but keeping order
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into();
            if !tag.trim().is_empty() && !unique.contains(&tag) {
                unique.push(tag);
            }
        }
        self.tags = unique;
        self
    }

    /// Set rating and review count
    pub fn with_rating(mut self, avg_rating: f64, total_reviews: i64) -> Self {
        self.avg_rating = avg_rating;
        self.total_reviews = total_reviews;
        self
    }

    /// Set stock level
    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as delisted
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Whether at least one unit is available
    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Recommendation row to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    /// Actor the recommendation was produced for
    pub actor: Actor,
    /// Recommended product
    pub product_id: i64,
    /// Signal that produced it
    pub kind: RecommendationType,
    /// Score in `[0, 1]`
    pub score: f64,
    /// Human-readable justification
    pub reasoning: Vec<String>,
    /// Generation time
    pub created_at: DateTime<Utc>,
}

/// Stored recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    /// Database ID
    pub id: i64,
    /// Actor the recommendation was produced for
    pub actor: Actor,
    /// Recommended product
    pub product_id: i64,
    /// Signal that produced it
    pub kind: RecommendationType,
    /// Score in `[0, 1]`, four decimal places
    pub score: f64,
    /// Human-readable justification
    pub reasoning: Vec<String>,
    /// Set once a click is attributed
    pub was_clicked: bool,
    /// Set once a purchase is attributed
    pub was_purchased: bool,
    /// Generation time
    pub created_at: DateTime<Utc>,
    /// Last feedback update
    pub updated_at: DateTime<Utc>,
}

/// Telemetry event for the analytics sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Actor the event concerns, if any
    pub actor: Option<Actor>,
    /// Event name, e.g. `recommendation_clicked`
    pub name: String,
    /// Flat key-value payload
    pub payload: JsonMap,
    /// When it was emitted
    pub created_at: DateTime<Utc>,
}

impl TrackedEvent {
    /// Event with an empty payload
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            actor: None,
            name: name.into(),
            payload: JsonMap::new(),
            created_at,
        }
    }

    /// Attach the actor
    pub fn for_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Add one payload entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Round to a fixed number of decimal places, matching the column precision.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::invalid(format!("timestamp out of range: {}", secs)))
}
