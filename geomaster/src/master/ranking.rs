//! Candidate ranking.
//!
//! When both candidates meet the client's minimum accuracy, the one needing
//! cheaper resources wins and accuracy breaks ties. Otherwise the more
//! accurate one wins. Every candidate meeting the minimum is more accurate
//! than every candidate that does not, so the two rules combine into a
//! total order.

use std::cmp::Ordering;

use super::ProviderId;
use crate::accuracy::{Accuracy, AccuracyLevel};

/// What ranking looks at for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankKey {
    /// Current accuracy of the candidate.
    pub accuracy: Accuracy,
    /// Cost of the candidate's required resources.
    pub cost: u32,
}

/// Compare two candidates; `Less` means `a` ranks first.
pub fn compare_rank(a: &RankKey, b: &RankKey, min_accuracy: AccuracyLevel) -> Ordering {
    let a_meets = a.accuracy.level() >= min_accuracy;
    let b_meets = b.accuracy.level() >= min_accuracy;

    if a_meets && b_meets {
        a.cost
            .cmp(&b.cost)
            .then_with(|| b.accuracy.compare(&a.accuracy))
    } else {
        b.accuracy.compare(&a.accuracy)
    }
}

/// Sort candidates best first. The sort is stable, so equally ranked
/// candidates keep their registry order.
pub fn rank_candidates<F>(candidates: &mut [ProviderId], min_accuracy: AccuracyLevel, key: F)
where
    F: Fn(ProviderId) -> RankKey,
{
    candidates.sort_by(|a, b| compare_rank(&key(*a), &key(*b), min_accuracy));
}
