// Collaborative filtering from interaction co-occurrence

use crate::candidate::{Candidate, CandidateSource};
use crate::config::CollaborativeSettings;
use crate::error::Result;
use lestockage::{
    Actor, HistoryQuery, InteractionStore, InteractionType, ProductCountQuery, RecommendationType,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Interaction types that define what an actor has engaged with
const PROFILE_KINDS: [InteractionType; 3] = [
    InteractionType::View,
    InteractionType::Purchase,
    InteractionType::AddToCart,
];

/// Interaction types that count as a neighbour endorsing a product
const ENDORSEMENT_KINDS: [InteractionType; 3] = [
    InteractionType::Purchase,
    InteractionType::AddToCart,
    InteractionType::Wishlist,
];

/// Reasoning attached to every collaborative candidate
pub const COLLABORATIVE_REASON: &str = "Similar users also liked this product";

/// Recommends what behaviourally similar actors bought, carted or wishlisted.
pub struct CollaborativeScorer<'a> {
    interactions: &'a dyn InteractionStore,
    settings: CollaborativeSettings,
}

impl<'a> CollaborativeScorer<'a> {
    /// Create a scorer over an interaction log
    pub fn new(interactions: &'a dyn InteractionStore, settings: CollaborativeSettings) -> Self {
        Self {
            interactions,
            settings,
        }
    }
}

impl CandidateSource for CollaborativeScorer<'_> {
    fn kind(&self) -> RecommendationType {
        RecommendationType::Collaborative
    }

    fn candidates(&self, actor: &Actor, limit: usize) -> Result<Vec<Candidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let history = self
            .interactions
            .history(actor, &HistoryQuery::of_kinds(&PROFILE_KINDS))?;
        let seen: BTreeSet<i64> = history.iter().map(|i| i.product_id).collect();
        if seen.is_empty() {
            return Ok(Vec::new());
        }

        let seen_ids: Vec<i64> = seen.iter().copied().collect();
        let neighbours: Vec<Actor> = self
            .interactions
            .count_by_actor(&seen_ids, actor)?
            .into_iter()
            .filter(|c| c.count > self.settings.min_co_occurrence)
            .take(self.settings.neighbour_limit)
            .map(|c| c.actor)
            .collect();
        if neighbours.is_empty() {
            debug!(%actor, "no similar actors");
            return Ok(Vec::new());
        }

        let counts = self.interactions.count_by_product(&ProductCountQuery {
            actors: Some(neighbours),
            kinds: ENDORSEMENT_KINDS.to_vec(),
            since: None,
        })?;

        let candidates: Vec<Candidate> = counts
            .into_iter()
            .filter(|c| !seen.contains(&c.product_id))
            .take(limit)
            .map(|c| {
                Candidate::new(
                    c.product_id,
                    RecommendationType::Collaborative,
                    c.count as f64 / self.settings.score_divisor,
                    vec![COLLABORATIVE_REASON.to_string()],
                )
            })
            .collect();

        debug!(%actor, candidates = candidates.len(), "collaborative candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lestockage::{NewInteraction, Storage};
    use tempfile::NamedTempFile;
    use InteractionType::*;

    fn storage() -> (NamedTempFile, Storage) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        (temp_file, storage)
    }

    fn log(storage: &Storage, actor: &Actor, product_id: i64, kind: InteractionType) {
        storage
            .record(&NewInteraction::new(actor.clone(), product_id, kind))
            .unwrap();
    }

    #[test]
    fn test_similar_user_purchase_becomes_candidate() {
        let (_file, storage) = storage();
        let a = Actor::user(1);
        let b = Actor::user(2);
        log(&storage, &a, 1, View);
        log(&storage, &a, 2, Purchase);
        log(&storage, &b, 1, Purchase);
        log(&storage, &b, 2, Purchase);
        log(&storage, &b, 3, Purchase);

        let scorer = CollaborativeScorer::new(&storage, CollaborativeSettings::default());
        let candidates = scorer.candidates(&a, 10).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].product_id, 3);
        assert_eq!(candidates[0].score, 0.1);
        assert_eq!(candidates[0].kind, RecommendationType::Collaborative);
        assert_eq!(candidates[0].reasoning, vec![COLLABORATIVE_REASON.to_string()]);
    }

    #[test]
    fn test_single_shared_interaction_is_not_enough() {
        let (_file, storage) = storage();
        let a = Actor::session("a");
        let b = Actor::session("b");
        log(&storage, &a, 1, View);
        log(&storage, &b, 1, View);
        log(&storage, &b, 5, Purchase);

        let scorer = CollaborativeScorer::new(&storage, CollaborativeSettings::default());
        assert!(scorer.candidates(&a, 10).unwrap().is_empty());
    }

    #[test]
    fn test_no_history_yields_nothing() {
        let (_file, storage) = storage();
        log(&storage, &Actor::user(2), 1, Purchase);
        let scorer = CollaborativeScorer::new(&storage, CollaborativeSettings::default());
        assert!(scorer.candidates(&Actor::user(1), 10).unwrap().is_empty());
    }

    #[test]
    fn test_views_by_neighbours_do_not_endorse() {
        let (_file, storage) = storage();
        let a = Actor::user(1);
        let b = Actor::user(2);
        log(&storage, &a, 1, Purchase);
        log(&storage, &b, 1, View);
        log(&storage, &b, 1, Click);
        log(&storage, &b, 4, View);
        log(&storage, &b, 5, Wishlist);
        log(&storage, &b, 5, AddToCart);

        let scorer = CollaborativeScorer::new(&storage, CollaborativeSettings::default());
        let candidates = scorer.candidates(&a, 10).unwrap();
        let ids: Vec<i64> = candidates.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![5]);
        assert_eq!(candidates[0].score, 0.2);
    }

    #[test]
    fn test_scores_saturate_and_limit_applies() {
        let (_file, storage) = storage();
        let a = Actor::user(1);
        log(&storage, &a, 1, View);
        for id in 2..=4 {
            let neighbour = Actor::user(id);
            log(&storage, &neighbour, 1, View);
            log(&storage, &neighbour, 1, View);
            for _ in 0..4 {
                log(&storage, &neighbour, 10, Purchase);
            }
            log(&storage, &neighbour, 11, Purchase);
        }

        let scorer = CollaborativeScorer::new(&storage, CollaborativeSettings::default());
        let candidates = scorer.candidates(&a, 1).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].product_id, 10);
        assert_eq!(candidates[0].score, 1.0);
    }
}
