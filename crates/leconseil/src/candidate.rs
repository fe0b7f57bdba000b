// Scored candidates and the merge step of the aggregator

use crate::error::Result;
use lestockage::{Actor, RecommendationType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A product proposed by one scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Proposed product
    pub product_id: i64,
    /// Scorer that proposed it
    pub kind: RecommendationType,
    /// Score in `[0, 1]`
    pub score: f64,
    /// Human-readable justification
    pub reasoning: Vec<String>,
}

impl Candidate {
    /// Build a candidate, clamping the score into `[0, 1]`
    pub fn new(
        product_id: i64,
        kind: RecommendationType,
        score: f64,
        reasoning: Vec<String>,
    ) -> Self {
        Self {
            product_id,
            kind,
            score: clamp_score(score),
            reasoning,
        }
    }
}

/// Clamp into `[0, 1]`; NaN maps to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Descending score order for `sort_by`
pub(crate) fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// A scorer the aggregator can call for an actor.
pub trait CandidateSource {
    /// Recommendation type stamped on the candidates
    fn kind(&self) -> RecommendationType;

    /// Up to `limit` candidates for `actor`, best first
    fn candidates(&self, actor: &Actor, limit: usize) -> Result<Vec<Candidate>>;
}

/// Merge scorer outputs into one ranked list.
///
/// Keeps one candidate per product: the highest score wins and the first
/// one encountered wins a tie. Groups keep the position of their first
/// appearance, then a stable sort orders them by score, descending, and the
/// list is cut at `limit`.
pub fn merge_candidates<I>(lists: I, limit: usize) -> Vec<Candidate>
where
    I: IntoIterator<Item = Vec<Candidate>>,
{
    let mut merged: Vec<Candidate> = Vec::new();
    let mut slots: HashMap<i64, usize> = HashMap::new();

    for candidate in lists.into_iter().flatten() {
        match slots.get(&candidate.product_id) {
            Some(&slot) => {
                if candidate.score > merged[slot].score {
                    merged[slot] = candidate;
                }
            }
            None => {
                slots.insert(candidate.product_id, merged.len());
                merged.push(candidate);
            }
        }
    }

    merged.sort_by(|a, b| by_score_desc(a.score, b.score));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use RecommendationType::*;

    fn c(product_id: i64, kind: RecommendationType, score: f64) -> Candidate {
        Candidate::new(product_id, kind, score, Vec::new())
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(1.5), 1.0);
        assert_eq!(clamp_score(-0.1), 0.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(0.25), 0.25);
    }

    #[test]
    fn test_highest_score_wins_per_product() {
        let merged = merge_candidates(
            vec![
                vec![c(1, Collaborative, 0.2)],
                vec![c(1, ContentBased, 0.6), c(2, ContentBased, 0.5)],
                vec![c(2, Trending, 0.1)],
            ],
            10,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!((merged[0].product_id, merged[0].kind), (1, ContentBased));
        assert_eq!((merged[1].product_id, merged[1].kind), (2, ContentBased));
    }

    #[test]
    fn test_ties_keep_first_encountered() {
        let merged = merge_candidates(
            vec![vec![c(7, Collaborative, 0.4)], vec![c(7, Trending, 0.4), c(8, Trending, 0.4)]],
            10,
        );
        assert_eq!(merged[0].kind, Collaborative);
        let ids: Vec<i64> = merged.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn test_limit_truncates() {
        let merged = merge_candidates(vec![vec![c(1, Trending, 0.1), c(2, Trending, 0.9)]], 1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].product_id, 2);
        assert!(merge_candidates(vec![vec![c(1, Trending, 0.1)]], 0).is_empty());
    }

    fn arb_candidate() -> impl Strategy<Value = Candidate> {
        (0i64..20, prop::sample::select(RecommendationType::ALL.to_vec()), -1.0f64..2.0)
            .prop_map(|(id, kind, score)| Candidate::new(id, kind, score, Vec::new()))
    }

    proptest! {
        #[test]
        fn prop_merge_is_deduplicated_sorted_and_bounded(
            lists in prop::collection::vec(prop::collection::vec(arb_candidate(), 0..15), 0..4),
            limit in 0usize..25,
        ) {
            let merged = merge_candidates(lists.clone(), limit);

            prop_assert!(merged.len() <= limit);
            let ids: HashSet<i64> = merged.iter().map(|c| c.product_id).collect();
            prop_assert_eq!(ids.len(), merged.len());
            for pair in merged.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for candidate in &merged {
                prop_assert!((0.0..=1.0).contains(&candidate.score));
                let best = lists
                    .iter()
                    .flatten()
                    .filter(|c| c.product_id == candidate.product_id)
                    .map(|c| c.score)
                    .fold(0.0f64, f64::max);
                prop_assert_eq!(candidate.score, best);
            }
        }
    }
}
