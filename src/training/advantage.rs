//! Group-relative advantage and winner selection.
//!
//! The advantage of candidate i is its reward minus the group mean:
//!
//!   A_i = R_i - mean({R_j})
//!
//! No variance normalisation and no clipping. Selection exploits the argmax
//! by default and, with probability `exploration_rate`, samples from a
//! shifted soft-max over the advantages instead.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::InvariantViolation;

/// Subtract the arithmetic mean from every reward.
///
/// Returns an empty vector for an empty group.
pub fn compute_advantages(rewards: &[f64]) -> Vec<f64> {
    if rewards.is_empty() {
        return Vec::new();
    }
    let mean = rewards.iter().sum::<f64>() / rewards.len() as f64;
    rewards.iter().map(|r| r - mean).collect()
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        match best {
            Some(b) if values[b] >= *v => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Soft-max weights `exp(a - max(a))`, shifted so the largest is exactly 1.
pub fn softmax_weights(advantages: &[f64]) -> Vec<f64> {
    let max = advantages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    advantages.iter().map(|a| (a - max).exp()).collect()
}

/// Pick the winning candidate.
///
/// At `exploration_rate = 0` this is exactly [`argmax`] and the RNG is never
/// consulted.
pub fn select_index<R: Rng + ?Sized>(
    advantages: &[f64],
    exploration_rate: f64,
    rng: &mut R,
) -> Result<usize, InvariantViolation> {
    let greedy = argmax(advantages)
        .ok_or_else(|| InvariantViolation::new("cannot select from an empty candidate set"))?;
    if exploration_rate <= 0.0 || !rng.gen_bool(exploration_rate.min(1.0)) {
        return Ok(greedy);
    }
    let weights = softmax_weights(advantages);
    match WeightedIndex::new(&weights) {
        Ok(dist) => Ok(dist.sample(rng)),
        // Non-finite advantages leave no valid distribution; exploit instead.
        Err(_) => Ok(greedy),
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_advantages_basic() {
        let advs = compute_advantages(&[1.0, 2.0, 3.0]);
        assert!((advs[0] - (-1.0)).abs() < 1e-9);
        assert!(advs[1].abs() < 1e-9);
        assert!((advs[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_advantages_not_variance_normalised() {
        let advs = compute_advantages(&[0.0, 10.0]);
        assert!((advs[0] - (-5.0)).abs() < 1e-9);
        assert!((advs[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_advantages_empty_and_single() {
        assert!(compute_advantages(&[]).is_empty());
        let single = compute_advantages(&[4.2]);
        assert_eq!(single.len(), 1);
        assert!(single[0].abs() < 1e-9);
    }

    #[test]
    fn test_advantages_sum_to_zero() {
        let groups: Vec<Vec<f64>> = vec![
            vec![0.1, 0.4, 0.7, 0.9, 1.0, 0.0, 0.3, 0.6],
            vec![7.6, 7.6, 7.6],
            vec![-3.0, 1e6, 2.5],
            vec![5.0],
        ];
        for rewards in groups {
            let sum: f64 = compute_advantages(&rewards).iter().sum();
            let scale = rewards.iter().map(|r| r.abs()).fold(1.0, f64::max);
            assert!(sum.abs() < 1e-9 * scale, "sum {sum} for {rewards:?}");
        }
    }

    #[test]
    fn test_argmax_ties_lowest_index() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[0.0, 0.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_select_without_exploration_is_argmax_of_rewards() {
        let mut rng = StdRng::seed_from_u64(7);
        let groups = vec![
            vec![3.0, 9.0, 1.0],
            vec![5.0, 5.0, 4.0],
            vec![-1.0],
            vec![2.0, 8.0, 8.0, 0.5],
        ];
        for rewards in groups {
            let advs = compute_advantages(&rewards);
            let picked = select_index(&advs, 0.0, &mut rng).unwrap();
            assert_eq!(Some(picked), argmax(&rewards));
        }
    }

    #[test]
    fn test_select_empty_is_violation() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_index(&[], 0.5, &mut rng).is_err());
    }

    #[test]
    fn test_full_exploration_stays_in_range_and_prefers_best() {
        let mut rng = StdRng::seed_from_u64(42);
        let advs = compute_advantages(&[0.0, 0.0, 5.0]);
        let mut counts = [0usize; 3];
        for _ in 0..2000 {
            counts[select_index(&advs, 1.0, &mut rng).unwrap()] += 1;
        }
        assert!(counts[2] > counts[0]);
        assert!(counts[2] > counts[1]);
    }

    #[test]
    fn test_seeded_selection_is_reproducible() {
        let advs = compute_advantages(&[1.0, 2.0, 3.0, 2.5]);
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| select_index(&advs, 0.5, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_softmax_weights_shifted() {
        let w = softmax_weights(&[1000.0, 999.0]);
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!(w[1] > 0.0 && w[1] < 1.0);
    }
}
