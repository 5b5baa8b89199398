//! Recall and latency statistics.

use std::collections::HashSet;
use std::time::Duration;

use crate::matrix::Matrix;

/// Latency statistics over a set of stage durations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    /// Average latency in milliseconds
    pub avg_ms: f64,
    /// Median (p50) latency in milliseconds
    pub p50_ms: f64,
    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,
    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,
    /// Minimum latency in milliseconds
    pub min_ms: f64,
    /// Maximum latency in milliseconds
    pub max_ms: f64,
    /// Number of measurements
    pub count: usize,
}

impl LatencyStats {
    pub fn from_durations(durations: &[Duration]) -> Self {
        let ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        Self::from_latencies(&ms)
    }

    /// Compute statistics from latencies in milliseconds.
    pub fn from_latencies(latencies: &[f64]) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut sorted = latencies.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = sorted.iter().sum();
        Self {
            avg_ms: sum / sorted.len() as f64,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            count: sorted.len(),
        }
    }

    /// Format as a summary string.
    pub fn summary(&self) -> String {
        format!(
            "avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, n={}",
            self.avg_ms, self.p50_ms, self.p95_ms, self.p99_ms, self.count
        )
    }
}

/// Value at percentile `p` (0-100) of ascending `sorted_values`.
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

/// Mean Recall@k of `results` against `truth`, row by row.
///
/// Recall = |retrieved ∩ relevant| / |relevant|, both truncated to `k`.
/// Padding ids (`-1`) never count as hits. Rows beyond the shorter matrix are
/// ignored; an empty comparison yields 0.
pub fn compute_recall(results: &Matrix<i64>, truth: &Matrix<i64>, k: usize) -> f64 {
    let rows = results.rows().min(truth.rows());
    if rows == 0 || k == 0 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..rows {
        let retrieved: HashSet<i64> = results.row(i).iter().take(k).copied().filter(|&id| id >= 0).collect();
        let relevant: HashSet<i64> = truth.row(i).iter().take(k).copied().filter(|&id| id >= 0).collect();
        if relevant.is_empty() {
            continue;
        }
        let hits = retrieved.intersection(&relevant).count();
        total += hits as f64 / relevant.len() as f64;
    }
    total / rows as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_recall() {
        let truth = Matrix::from_vec(vec![0, 1, 2, 3, 4, 5], 2, 3).unwrap();
        let perfect = truth.clone();
        assert!((compute_recall(&perfect, &truth, 3) - 1.0).abs() < 1e-9);

        let half = Matrix::from_vec(vec![0, 9, 8, 3, 4, 7], 2, 3).unwrap();
        // row 0: 1/3, row 1: 2/3
        assert!((compute_recall(&half, &truth, 3) - 0.5).abs() < 1e-9);
        // Recall@1: row 0 hit, row 1 hit
        assert!((compute_recall(&half, &truth, 1) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_padding_is_not_a_hit() {
        let truth = Matrix::from_vec(vec![-1, -1], 1, 2).unwrap();
        let results = Matrix::from_vec(vec![-1, -1], 1, 2).unwrap();
        assert_eq!(compute_recall(&results, &truth, 2), 0.0);
    }

    #[test]
    fn test_latency_stats() {
        let stats = LatencyStats::from_latencies(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min_ms, 1.0);
        assert_eq!(stats.max_ms, 5.0);
        assert_eq!(stats.p50_ms, 3.0);
        assert!((stats.avg_ms - 3.0).abs() < 1e-9);

        let d = LatencyStats::from_durations(&[Duration::from_millis(2), Duration::from_millis(4)]);
        assert!((d.avg_ms - 3.0).abs() < 1e-9);
        assert_eq!(LatencyStats::from_latencies(&[]).count, 0);
    }

    #[test]
    fn test_percentile() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 4.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
