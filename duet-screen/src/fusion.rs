//! Rank fusion
//!
//! Pure functions combining several ranked candidate lists. Position in a
//! list is its 1-based rank; a candidate missing from a list simply receives
//! no contribution from it.

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Invalid fusion arguments
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    #[error("Got {lists} ranked lists but {weights} weights")]
    LengthMismatch { lists: usize, weights: usize },

    #[error("Fusion weights must sum to a positive value, got {0}")]
    NonPositiveWeightSum(f64),

    #[error("Fusion constant must be positive, got {0}")]
    NonPositiveConstant(f64),
}

fn check_lengths<T>(lists: &[T], weights: &[f64]) -> Result<(), FusionError> {
    if lists.len() != weights.len() {
        return Err(FusionError::LengthMismatch {
            lists: lists.len(),
            weights: weights.len(),
        });
    }
    Ok(())
}

/// Visit each candidate once per list with its 1-based rank (first occurrence wins)
fn ranked<'a>(list: &'a [String]) -> impl Iterator<Item = (usize, &'a String)> + 'a {
    let mut seen = HashSet::new();
    list.iter()
        .enumerate()
        .filter(move |(_, candidate)| seen.insert(candidate.as_str()))
        .map(|(position, candidate)| (position + 1, candidate))
}

/// Weighted mean rank per candidate; lower is better
///
/// `cost(c) = Σ w_i · rank_i(c) / Σ w_i`, summing the numerator only over
/// lists that contain `c` and the denominator over all weights.
pub fn weighted_average_rank(
    lists: &[Vec<String>],
    weights: &[f64],
) -> Result<BTreeMap<String, f64>, FusionError> {
    check_lengths(lists, weights)?;
    let total: f64 = weights.iter().sum();
    if total.is_nan() || total <= 0.0 {
        return Err(FusionError::NonPositiveWeightSum(total));
    }

    let mut costs: BTreeMap<String, f64> = BTreeMap::new();
    for (list, weight) in lists.iter().zip(weights) {
        for (rank, candidate) in ranked(list) {
            *costs.entry(candidate.clone()).or_insert(0.0) += weight * rank as f64;
        }
    }
    for cost in costs.values_mut() {
        *cost /= total;
    }
    Ok(costs)
}

/// Weighted reciprocal rank fusion; higher is better
///
/// `fused(c) = Σ w_i / (constant + rank_i(c))` over lists containing `c`
/// whose weight is positive. Returned best first; equal scores are ordered
/// by ascending candidate id.
pub fn weighted_reciprocal_rank_fusion(
    lists: &[Vec<String>],
    weights: &[f64],
    constant: f64,
) -> Result<Vec<(String, f64)>, FusionError> {
    check_lengths(lists, weights)?;
    if constant.is_nan() || constant <= 0.0 {
        return Err(FusionError::NonPositiveConstant(constant));
    }

    let mut fused: BTreeMap<String, f64> = BTreeMap::new();
    for (list, &weight) in lists.iter().zip(weights) {
        if weight <= 0.0 {
            continue;
        }
        for (rank, candidate) in ranked(list) {
            *fused.entry(candidate.clone()).or_insert(0.0) += weight / (constant + rank as f64);
        }
    }

    // BTreeMap iteration is id-ascending, so a stable sort keeps id order on ties
    let mut ordered: Vec<(String, f64)> = fused.into_iter().collect();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(ordered)
}
