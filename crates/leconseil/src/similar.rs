// Pairwise product similarity

use crate::candidate::{by_score_desc, Candidate};
use crate::config::SimilarSettings;
use crate::error::Result;
use lestockage::{CatalogStore, Product, RecommendationType};
use std::collections::HashSet;

/// Closeness of two prices in `[0, 1]`; equal prices (including two zeros) give 1
pub fn price_similarity(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max > 0.0 {
        1.0 - (a - b).abs() / max
    } else {
        1.0
    }
}

/// Closeness of two ratings on the 0-5 scale
pub fn rating_similarity(a: f64, b: f64) -> f64 {
    (5.0 - (a - b).abs()) / 5.0
}

/// Number of tags two products share
pub fn common_tags(a: &Product, b: &Product) -> usize {
    let tags: HashSet<&str> = a.tags.iter().map(String::as_str).collect();
    b.tags
        .iter()
        .map(String::as_str)
        .collect::<HashSet<_>>()
        .intersection(&tags)
        .count()
}

/// Scores active products of the same category against a target product.
pub struct ProductSimilarityScorer<'a> {
    catalog: &'a dyn CatalogStore,
    settings: SimilarSettings,
}

impl<'a> ProductSimilarityScorer<'a> {
    /// Create a scorer over a catalog
    pub fn new(catalog: &'a dyn CatalogStore, settings: SimilarSettings) -> Self {
        Self { catalog, settings }
    }

    /// Similarity of `candidate` to `target`, clamped to 1.0
    pub fn score(&self, target: &Product, candidate: &Product) -> f64 {
        let s = &self.settings;
        common_tags(target, candidate) as f64 * s.tag_weight
            + price_similarity(target.price, candidate.price) * s.price_weight
            + rating_similarity(target.avg_rating, candidate.avg_rating) * s.rating_weight
            + candidate.total_reviews as f64 * s.review_weight
    }

    /// Up to `limit` products most similar to `product_id`; empty for an unknown id
    pub fn similar_to(&self, product_id: i64, limit: usize) -> Result<Vec<Candidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(target) = self.catalog.product(product_id)? else {
            return Ok(Vec::new());
        };

        let mut candidates: Vec<Candidate> = self
            .catalog
            .active_in_category(&target.category)?
            .into_iter()
            .filter(|p| p.id != target.id)
            .map(|p| {
                let shared = common_tags(&target, &p);
                Candidate::new(
                    p.id,
                    RecommendationType::Similar,
                    self.score(&target, &p),
                    vec![
                        "Similar to the product you're viewing".to_string(),
                        format!("Same category: {}", p.category),
                        format!("{} common tags", shared),
                    ],
                )
            })
            .collect();

        candidates.sort_by(|a, b| by_score_desc(a.score, b.score));
        candidates.truncate(limit);
        Ok(candidates)
    }
}
