// Null distribution of the maximum cluster statistic
//
// One entry per permutation (0.0 when a permutation produced no cluster). The
// observed labeling is the extra reference point in every p-value:
//
//   p = (1 + #{null >= observed}) / (len + 1)
//
// so the smallest attainable p-value is 1 / (len + 1), never zero.

use serde::{Deserialize, Serialize};

/// Corrected p-value at or below which a cluster is reported as significant
///
/// Fixed for reporting, independent of the cluster-forming alpha.
pub const SIGNIFICANCE_CUTOFF: f64 = 0.05;

/// Maximum cluster statistic of every permutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullDistribution {
    maxima: Vec<f64>,
}

/// Descriptive summary of a null distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NullSummary {
    pub len: usize,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    /// Fraction of permutations that produced no cluster at all
    pub empty_fraction: f64,
}

impl NullDistribution {
    pub fn new(maxima: Vec<f64>) -> Self {
        Self { maxima }
    }

    /// Number of permutation entries (excluding the observed run)
    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.maxima
    }

    /// Permutation entries plus the observed labeling
    pub fn n_reference_points(&self) -> usize {
        self.maxima.len() + 1
    }

    /// Corrected p-value of an observed cluster statistic (ties inclusive)
    pub fn corrected_p(&self, observed: f64) -> f64 {
        let at_least = self.maxima.iter().filter(|&&m| m >= observed).count();
        (at_least + 1) as f64 / self.n_reference_points() as f64
    }

    /// Min, median and max, or `None` for an empty distribution
    pub fn summary(&self) -> Option<NullSummary> {
        if self.maxima.is_empty() {
            return None;
        }

        let mut sorted = self.maxima.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let empty = sorted.iter().filter(|&&m| m == 0.0).count();

        Some(NullSummary {
            len: n,
            min: sorted[0],
            median,
            max: sorted[n - 1],
            empty_fraction: empty as f64 / n as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p_value_counts_ties_inclusively() {
        let null = NullDistribution::new(vec![1.0, 2.0, 3.0, 3.0]);
        // Two entries >= 3.0, plus the observed run, over 5 reference points
        assert_eq!(null.corrected_p(3.0), 3.0 / 5.0);
    }

    #[test]
    fn test_p_value_never_zero() {
        let null = NullDistribution::new(vec![0.0; 99]);
        assert_eq!(null.corrected_p(1e6), 1.0 / 100.0);
    }

    #[test]
    fn test_p_value_at_most_one() {
        let null = NullDistribution::new(vec![5.0, 6.0, 7.0]);
        assert_eq!(null.corrected_p(0.0), 1.0);
    }

    #[test]
    fn test_reference_points_include_observed() {
        let null = NullDistribution::new(vec![0.0; 10]);
        assert_eq!(null.len(), 10);
        assert_eq!(null.n_reference_points(), 11);
    }

    #[test]
    fn test_summary_odd_and_even() {
        let odd = NullDistribution::new(vec![3.0, 0.0, 9.0]).summary().unwrap();
        assert_eq!(odd.min, 0.0);
        assert_eq!(odd.median, 3.0);
        assert_eq!(odd.max, 9.0);
        assert!((odd.empty_fraction - 1.0 / 3.0).abs() < 1e-12);

        let even = NullDistribution::new(vec![4.0, 1.0, 2.0, 3.0]).summary().unwrap();
        assert_eq!(even.median, 2.5);
    }

    #[test]
    fn test_summary_empty() {
        assert!(NullDistribution::new(Vec::new()).summary().is_none());
    }
}
