//! Sequential outlier detection.
//!
//! A value is a sequential outlier when it is abnormally distant from both
//! of its neighbours. Consecutive absolute differences are scored with a
//! Gaussian kernel density estimate and split into a dense and a sparse
//! cluster; a row whose incoming and outgoing differences both land in the
//! sparse cluster is flagged. Missing values break the sequence and are
//! flagged as well.

const MAX_KMEANS_ITERATIONS: usize = 100;

/// Flags sequential outliers in a column, returning one flag per row.
pub fn identify_sequential_outliers(values: &[Option<f64>]) -> Vec<bool> {
    let mut mask: Vec<bool> = values.iter().map(Option::is_none).collect();

    let present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(row, value)| value.map(|v| (row, v)))
        .collect();
    if present.len() < 3 {
        return mask;
    }

    let deltas: Vec<f64> = present.windows(2).map(|w| (w[1].1 - w[0].1).abs()).collect();
    let Some(sparse) = sparse_deltas(&deltas) else {
        return mask;
    };

    let last = present.len() - 1;
    for (position, (row, _)) in present.iter().enumerate() {
        let outlier = if position == 0 {
            sparse[0]
        } else if position == last {
            sparse[last - 1]
        } else {
            sparse[position - 1] && sparse[position]
        };
        if outlier {
            mask[*row] = true;
        }
    }
    mask
}

/// Labels each difference as belonging to the low-density cluster.
///
/// Returns `None` when the scores do not separate into two clusters.
fn sparse_deltas(deltas: &[f64]) -> Option<Vec<bool>> {
    let bandwidth = silverman_bandwidth(deltas)
        .or_else(|| mode_bandwidth(deltas))
        .unwrap_or(1.0);
    let scores = kde_scores(deltas, bandwidth);
    let labels = two_means(&scores)?;
    tracing::trace!(
        "Sequential KDE bandwidth {:.4}, {} of {} differences sparse",
        bandwidth,
        labels.iter().filter(|l| **l).count(),
        labels.len()
    );
    Some(labels)
}

/// Silverman's rule of thumb, `None` when the data has no spread.
fn silverman_bandwidth(data: &[f64]) -> Option<f64> {
    let n = data.len() as f64;
    let std_dev = super::statistics::sample_std_dev(data)?;

    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);

    let spread = if iqr > 0.0 {
        std_dev.min(iqr / 1.34)
    } else {
        std_dev
    };
    let bandwidth = 0.9 * spread * n.powf(-0.2);
    (bandwidth.is_finite() && bandwidth > 0.0).then_some(bandwidth)
}

/// Half the smallest most frequent positive difference.
fn mode_bandwidth(data: &[f64]) -> Option<f64> {
    let mut positive: Vec<f64> = data.iter().copied().filter(|d| *d > 0.0).collect();
    if positive.is_empty() {
        return None;
    }
    positive.sort_by(f64::total_cmp);

    let mut best = (positive[0], 0usize);
    let mut run = (positive[0], 0usize);
    for value in &positive {
        if *value == run.0 {
            run.1 += 1;
        } else {
            run = (*value, 1);
        }
        if run.1 > best.1 {
            best = run;
        }
    }
    Some(best.0 / 2.0)
}

/// Linear-interpolated quantile of sorted data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Gaussian kernel density evaluated at every data point.
fn kde_scores(data: &[f64], bandwidth: f64) -> Vec<f64> {
    let norm = 1.0 / (data.len() as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    data.iter()
        .map(|x| {
            data.iter()
                .map(|xi| {
                    let u = (x - xi) / bandwidth;
                    (-0.5 * u * u).exp()
                })
                .sum::<f64>()
                * norm
        })
        .collect()
}

/// One-dimensional 2-means. `true` marks members of the lower cluster.
fn two_means(scores: &[f64]) -> Option<Vec<bool>> {
    let min = scores.iter().copied().reduce(f64::min)?;
    let max = scores.iter().copied().reduce(f64::max)?;
    if (max - min).abs() <= f64::EPSILON * max.abs().max(1.0) {
        return None;
    }

    let (mut low, mut high) = (min, max);
    let mut labels: Vec<bool> = Vec::new();
    for _ in 0..MAX_KMEANS_ITERATIONS {
        let next: Vec<bool> = scores
            .iter()
            .map(|s| (s - low).abs() <= (s - high).abs())
            .collect();
        if next == labels {
            break;
        }
        labels = next;

        let (low_sum, low_count, high_sum, high_count) = scores.iter().zip(&labels).fold(
            (0.0, 0usize, 0.0, 0usize),
            |(ls, lc, hs, hc), (score, is_low)| {
                if *is_low {
                    (ls + score, lc + 1, hs, hc)
                } else {
                    (ls, lc, hs + score, hc + 1)
                }
            },
        );
        if low_count == 0 || high_count == 0 {
            return None;
        }
        low = low_sum / low_count as f64;
        high = high_sum / high_count as f64;
    }
    Some(labels)
}
