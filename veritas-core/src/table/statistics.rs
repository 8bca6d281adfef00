//! Summary statistics over numeric columns.
//!
//! Conventions match the profiling layer that produces the metadata
//! statistics: sample standard deviation, adjusted Fisher-Pearson skewness
//! and bias-corrected excess kurtosis.

use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintRange;

/// Summary statistics for one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Number of numeric values
    pub count: usize,
    /// Smallest value
    pub min: Option<f64>,
    /// Largest value
    pub max: Option<f64>,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Median
    pub median: Option<f64>,
    /// Sample standard deviation, needs two values
    pub std_dev: Option<f64>,
    /// Adjusted skewness, needs three values
    pub skewness: Option<f64>,
    /// Excess kurtosis, needs four values
    pub kurtosis: Option<f64>,
    /// Net direction of consecutive steps, in `[0, 1]`
    pub monotonicity_ratio: f64,
}

impl SummaryStatistics {
    /// Computes statistics over values in row order.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            count: values.len(),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            mean: mean(values),
            median: median(values),
            std_dev: sample_std_dev(values),
            skewness: skewness(values),
            kurtosis: kurtosis(values),
            monotonicity_ratio: monotonicity_ratio(values),
        }
    }
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, averaging the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (divides by n-1).
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn central_moment_sums(values: &[f64]) -> Option<(f64, f64, f64)> {
    let m = mean(values)?;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for value in values {
        let d = value - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    Some((m2, m3, m4))
}

/// Adjusted Fisher-Pearson skewness. Constant columns have skewness 0.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 3 {
        return None;
    }
    let (m2, m3, _) = central_moment_sums(values)?;
    if m2 == 0.0 {
        return Some(0.0);
    }
    let (m2, m3) = (m2 / n, m3 / n);
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n * (n - 1.0)).sqrt() / (n - 2.0))
}

/// Bias-corrected excess kurtosis. Constant columns have kurtosis 0.
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 4 {
        return None;
    }
    let (m2, _, m4) = central_moment_sums(values)?;
    if m2 == 0.0 {
        return Some(0.0);
    }
    let adjustment = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    let numerator = n * (n + 1.0) * (n - 1.0) * m4;
    let denominator = (n - 2.0) * (n - 3.0) * m2 * m2;
    Some(numerator / denominator - adjustment)
}

/// `|sum(sign(diff))| / (n - 1)`; zero for fewer than two values.
pub fn monotonicity_ratio(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let signs: f64 = values
        .windows(2)
        .map(|pair| {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                1.0
            } else if delta < 0.0 {
                -1.0
            } else {
                0.0
            }
        })
        .sum();
    (signs / (values.len() - 1) as f64).abs()
}

/// A normal distribution used to build standard-deviation bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalDistribution {
    /// Mean
    pub mean: f64,
    /// Standard deviation
    pub std_dev: f64,
}

impl NormalDistribution {
    /// Creates a distribution.
    pub fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    /// Value `std_devs` standard deviations away from the mean.
    pub fn value_x_std_devs_from_mean(&self, std_devs: i32) -> f64 {
        self.mean + f64::from(std_devs) * self.std_dev
    }

    /// One standard deviation wide band starting at `std_devs` and extending
    /// outward.
    ///
    /// `-3` yields `[mean-4σ, mean-3σ]`, `3` yields `[mean+3σ, mean+4σ]`.
    pub fn bounded_range_x_std_devs_from_mean(&self, std_devs: i32) -> ConstraintRange {
        if std_devs < 0 {
            ConstraintRange::new(
                self.value_x_std_devs_from_mean(std_devs - 1),
                self.value_x_std_devs_from_mean(std_devs),
            )
        } else {
            ConstraintRange::new(
                self.value_x_std_devs_from_mean(std_devs),
                self.value_x_std_devs_from_mean(std_devs + 1),
            )
        }
    }

    /// Band from `std_devs` outward to infinity.
    pub fn unbounded_range_x_std_devs_from_mean(&self, std_devs: i32) -> ConstraintRange {
        if std_devs < 0 {
            ConstraintRange::new(f64::NEG_INFINITY, self.value_x_std_devs_from_mean(std_devs))
        } else {
            ConstraintRange::new(self.value_x_std_devs_from_mean(std_devs), f64::INFINITY)
        }
    }

    /// Lower and upper bands `std_devs` away from the mean.
    pub fn bands(&self, std_devs: i32, bounded: bool) -> (ConstraintRange, ConstraintRange) {
        if bounded {
            (
                self.bounded_range_x_std_devs_from_mean(-std_devs),
                self.bounded_range_x_std_devs_from_mean(std_devs),
            )
        } else {
            (
                self.unbounded_range_x_std_devs_from_mean(-std_devs),
                self.unbounded_range_x_std_devs_from_mean(std_devs),
            )
        }
    }
}
