// Per-location paired t-statistic and the cluster-forming threshold
//
// The statistic is a one-sample t-test on sign-flipped paired contrasts:
//   t = mean(s_k * c_k) / (std(s_k * c_k) / sqrt(N)),  df = N - 1
//
// Variance uses the shifted-data algorithm: every signed value is offset by the
// first subject's signed value before accumulating, so identical subjects give
// an exactly-zero variance and large common offsets do not cancel.
//
// Zero variance => t = 0. Non-finite input propagates to a non-finite t, which
// the cluster extractor never admits to the threshold mask.

use crate::error::{ClusterTestError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Which excursions of the statistic are tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Tail {
    /// Two-sided: positive and negative excursions (tail = 0)
    #[default]
    Both,
    /// Positive excursions only (tail = 1)
    Upper,
    /// Negative excursions only (tail = -1)
    Lower,
}

impl Tail {
    pub fn includes_positive(self) -> bool {
        matches!(self, Tail::Both | Tail::Upper)
    }

    pub fn includes_negative(self) -> bool {
        matches!(self, Tail::Both | Tail::Lower)
    }
}

impl TryFrom<i64> for Tail {
    type Error = ClusterTestError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Tail::Both),
            1 => Ok(Tail::Upper),
            -1 => Ok(Tail::Lower),
            other => Err(ClusterTestError::UnsupportedTail(other)),
        }
    }
}

impl From<Tail> for i64 {
    fn from(tail: Tail) -> Self {
        match tail {
            Tail::Both => 0,
            Tail::Upper => 1,
            Tail::Lower => -1,
        }
    }
}

impl std::str::FromStr for Tail {
    type Err = ClusterTestError;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| ClusterTestError::InvalidConfig(format!("tail must be an integer, got '{}'", s)))?;
        Tail::try_from(value)
    }
}

/// A per-location test statistic over sign-flipped contrasts
///
/// `contrasts` has shape (subjects, locations); `signs` holds one ±1 per
/// subject; `out` receives one statistic per location. Returns the number of
/// locations where the statistic was degenerate (zero variance).
pub trait StatisticFn: Sync {
    fn compute(&self, contrasts: ArrayView2<'_, f64>, signs: &[f64], out: &mut [f64]) -> usize;

    /// Degrees of freedom used to derive the critical value
    fn degrees_of_freedom(&self, n_subjects: usize) -> f64;
}

/// One-sample Student t-test on paired differences
#[derive(Debug, Clone, Copy, Default)]
pub struct PairedTTest;

impl StatisticFn for PairedTTest {
    fn compute(&self, contrasts: ArrayView2<'_, f64>, signs: &[f64], out: &mut [f64]) -> usize {
        let n = contrasts.nrows();
        debug_assert_eq!(signs.len(), n);
        debug_assert_eq!(out.len(), contrasts.ncols());

        let n_f = n as f64;
        let mut degenerate = 0usize;

        for (column, t) in contrasts.columns().into_iter().zip(out.iter_mut()) {
            let mut values = column.iter().zip(signs).map(|(&c, &s)| s * c);
            let Some(shift) = values.next() else {
                *t = 0.0;
                continue;
            };

            let mut sum_d = 0.0;
            let mut sum_d2 = 0.0;
            for value in values {
                let d = value - shift;
                sum_d += d;
                sum_d2 += d * d;
            }

            let mean_d = sum_d / n_f;
            let variance = (sum_d2 - sum_d * mean_d) / (n_f - 1.0);
            let mean = shift + mean_d;

            *t = if !(mean.is_finite() && variance.is_finite()) {
                f64::NAN
            } else if variance <= 0.0 {
                degenerate += 1;
                0.0
            } else {
                mean / (variance / n_f).sqrt()
            };
        }

        degenerate
    }

    fn degrees_of_freedom(&self, n_subjects: usize) -> f64 {
        n_subjects as f64 - 1.0
    }
}

/// Critical |t| for a tail mode and significance level
///
/// - `Tail::Both`: `ppf(1 - alpha / 2)`
/// - `Tail::Upper`: `ppf(1 - alpha)`
/// - `Tail::Lower`: `|ppf(alpha)|`
///
/// The result is always a non-negative magnitude; the cluster extractor applies
/// the sign.
pub fn critical_value(alpha: f64, df: f64, tail: Tail) -> Result<f64> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(ClusterTestError::InvalidAlpha(alpha));
    }

    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| ClusterTestError::Distribution(e.to_string()))?;

    // |ppf(alpha)| == ppf(1 - alpha) for the symmetric t distribution; using the
    // upper quantile for both one-sided tails keeps them bit-identical.
    let quantile = match tail {
        Tail::Both => dist.inverse_cdf(1.0 - alpha / 2.0),
        Tail::Upper | Tail::Lower => dist.inverse_cdf(1.0 - alpha),
    };

    if !quantile.is_finite() {
        return Err(ClusterTestError::Distribution(format!(
            "non-finite quantile for alpha={} df={}",
            alpha, df
        )));
    }

    Ok(quantile.abs())
}
