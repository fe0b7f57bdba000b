// Content-based filtering from category and tag affinity

use crate::candidate::{by_score_desc, Candidate, CandidateSource};
use crate::config::ContentSettings;
use crate::error::Result;
use lestockage::{
    Actor, CatalogStore, HistoryQuery, InteractionStore, InteractionType, Product,
    RecommendationType,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const PROFILE_KINDS: [InteractionType; 3] = [
    InteractionType::View,
    InteractionType::Purchase,
    InteractionType::AddToCart,
];

/// Category and tag frequencies over an actor's recent products.
///
/// A product met twice in the history counts twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceProfile {
    /// Occurrences per category
    pub categories: HashMap<String, u64>,
    /// Occurrences per tag
    pub tags: HashMap<String, u64>,
    /// Products the profile was built from
    pub product_ids: HashSet<i64>,
}

impl PreferenceProfile {
    /// Build a profile from resolved products, one entry per interaction
    pub fn from_products<'p, I>(products: I) -> Self
    where
        I: IntoIterator<Item = &'p Product>,
    {
        let mut profile = PreferenceProfile::default();
        for product in products {
            profile.product_ids.insert(product.id);
            *profile.categories.entry(product.category.clone()).or_insert(0) += 1;
            for tag in product.tags.iter().filter(|t| !t.is_empty()) {
                *profile.tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        profile
    }

    /// Whether nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty()
    }

    /// Raw affinity of a product with this profile, before normalisation
    pub fn affinity(&self, product: &Product, settings: &ContentSettings) -> f64 {
        let category = self.categories.get(&product.category).copied().unwrap_or(0) as f64;
        let tags: u64 = product
            .tags
            .iter()
            .filter_map(|tag| self.tags.get(tag))
            .sum();

        category * settings.category_weight
            + tags as f64 * settings.tag_weight
            + product.avg_rating * settings.rating_weight
    }
}

/// Recommends active products that resemble what the actor engaged with recently.
pub struct AffinityScorer<'a> {
    interactions: &'a dyn InteractionStore,
    catalog: &'a dyn CatalogStore,
    settings: ContentSettings,
}

impl<'a> AffinityScorer<'a> {
    /// Create a scorer over an interaction log and a catalog
    pub fn new(
        interactions: &'a dyn InteractionStore,
        catalog: &'a dyn CatalogStore,
        settings: ContentSettings,
    ) -> Self {
        Self {
            interactions,
            catalog,
            settings,
        }
    }

    /// Profile of the actor's most recent engagements
    pub fn profile(&self, actor: &Actor) -> Result<PreferenceProfile> {
        let recent = self.interactions.history(
            actor,
            &HistoryQuery::of_kinds(&PROFILE_KINDS)
                .newest_first()
                .limit(self.settings.history_window),
        )?;
        if recent.is_empty() {
            return Ok(PreferenceProfile::default());
        }

        let mut ids: Vec<i64> = recent.iter().map(|i| i.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let resolved: HashMap<i64, Product> = self
            .catalog
            .products(&ids)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(PreferenceProfile::from_products(
            recent.iter().filter_map(|i| resolved.get(&i.product_id)),
        ))
    }
}

impl CandidateSource for AffinityScorer<'_> {
    fn kind(&self) -> RecommendationType {
        RecommendationType::ContentBased
    }

    fn candidates(&self, actor: &Actor, limit: usize) -> Result<Vec<Candidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let profile = self.profile(actor)?;
        if profile.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<Candidate> = self
            .catalog
            .active_products()?
            .into_iter()
            .filter(|p| !profile.product_ids.contains(&p.id))
            .map(|p| {
                let raw = profile.affinity(&p, &self.settings);
                Candidate::new(
                    p.id,
                    RecommendationType::ContentBased,
                    raw / self.settings.score_divisor,
                    vec![
                        "Similar to products you've viewed".to_string(),
                        format!("Category: {}", p.category),
                        format!("Rating: {:.2}/5", p.avg_rating),
                    ],
                )
            })
            .collect();

        candidates.sort_by(|a, b| by_score_desc(a.score, b.score));
        candidates.truncate(limit);

        debug!(%actor, candidates = candidates.len(), "content-based candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lestockage::{NewInteraction, Storage};
    use tempfile::NamedTempFile;

    fn seeded() -> (NamedTempFile, Storage) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        let products = [
            Product::new(1, "Trail Shoe", "shoes", 90.0).with_tags(["running", "trail"]),
            Product::new(2, "Road Shoe", "shoes", 80.0).with_tags(["running"]).with_rating(4.0, 3),
            Product::new(3, "Spike", "shoes", 70.0).with_tags(["track"]),
            Product::new(4, "Cap", "hats", 20.0).with_rating(5.0, 1),
            Product::new(5, "Old Shoe", "shoes", 10.0).with_tags(["running"]).inactive(),
        ];
        for product in &products {
            storage.upsert_product(product).unwrap();
        }
        (temp_file, storage)
    }

    #[test]
    fn test_profile_counts_per_interaction() {
        let (_file, storage) = seeded();
        let actor = Actor::user(1);
        for kind in [InteractionType::View, InteractionType::View, InteractionType::Click] {
            storage.record(&NewInteraction::new(actor.clone(), 1, kind)).unwrap();
        }
        storage
            .record(&NewInteraction::new(actor.clone(), 404, InteractionType::View))
            .unwrap();

        let scorer = AffinityScorer::new(&storage, &storage, ContentSettings::default());
        let profile = scorer.profile(&actor).unwrap();
        assert_eq!(profile.categories.get("shoes"), Some(&2));
        assert_eq!(profile.tags.get("trail"), Some(&2));
        assert_eq!(profile.product_ids, HashSet::from([1]));
    }

    #[test]
    fn test_ranks_by_category_tags_and_rating() {
        let (_file, storage) = seeded();
        let actor = Actor::session("s");
        storage
            .record(&NewInteraction::new(actor.clone(), 1, InteractionType::View))
            .unwrap();

        let scorer = AffinityScorer::new(&storage, &storage, ContentSettings::default());
        let candidates = scorer.candidates(&actor, 10).unwrap();
        let ids: Vec<i64> = candidates.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![2, 4, 3]);

        // 0.3 * 1 + 0.2 * 1 + 0.1 * 4.0 = 0.9, normalised by 10
        assert!((candidates[0].score - 0.09).abs() < 1e-9);
        assert_eq!(
            candidates[0].reasoning,
            vec![
                "Similar to products you've viewed".to_string(),
                "Category: shoes".to_string(),
                "Rating: 4.00/5".to_string(),
            ]
        );
    }

    #[test]
    fn test_only_recent_window_counts() {
        let (_file, storage) = seeded();
        let actor = Actor::user(9);
        let now = Utc::now();
        storage
            .record(
                &NewInteraction::new(actor.clone(), 4, InteractionType::View)
                    .at(now - Duration::days(1)),
            )
            .unwrap();
        storage
            .record(&NewInteraction::new(actor.clone(), 1, InteractionType::View).at(now))
            .unwrap();

        let settings = ContentSettings {
            history_window: 1,
            ..ContentSettings::default()
        };
        let scorer = AffinityScorer::new(&storage, &storage, settings);
        let profile = scorer.profile(&actor).unwrap();
        assert!(profile.categories.contains_key("shoes"));
        assert!(!profile.categories.contains_key("hats"));
    }

    #[test]
    fn test_no_history_yields_nothing() {
        let (_file, storage) = seeded();
        let scorer = AffinityScorer::new(&storage, &storage, ContentSettings::default());
        assert!(scorer.candidates(&Actor::user(1), 5).unwrap().is_empty());
    }
}
