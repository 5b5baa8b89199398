//! Exact top-k search shared by ground-truth backends and the flat engine.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::metric::MetricType;

/// Top-k neighbors for a batch of queries, row `i` answering query `i`.
///
/// Columns are ordered best first. Slots beyond the corpus size hold id `-1`
/// and the metric's worst distance.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbors {
    pub distances: Matrix<f32>,
    pub ids: Matrix<i64>,
}

impl Neighbors {
    /// Number of query rows.
    pub fn len(&self) -> usize {
        self.ids.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Neighbors per query.
    pub fn depth(&self) -> usize {
        self.ids.cols()
    }
}

/// Distance kernel used for scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    /// Portable scalar loops.
    Scalar,
    /// Runtime-dispatched SIMD kernels.
    Simd,
}

impl Kernel {
    #[inline]
    fn score(&self, metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
        use annb_core::distance::scalar;
        match (self, metric) {
            (Kernel::Scalar, MetricType::L2) => scalar::euclidean_squared(a, b),
            (Kernel::Scalar, MetricType::InnerProduct) => scalar::dot(a, b),
            (Kernel::Simd, m) => m.score(a, b),
        }
    }
}

// Max-heap entry; the top is the worst kept candidate.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    key: f32,
    id: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Best `k` corpus rows for one query, written into `dist_out` / `id_out`.
fn search_row(
    query: &[f32],
    data: &Matrix<f32>,
    k: usize,
    metric: MetricType,
    kernel: Kernel,
    dist_out: &mut [f32],
    id_out: &mut [i64],
) {
    // Keys are "smaller is better" for both metrics.
    let sign = match metric {
        MetricType::L2 => 1.0,
        MetricType::InnerProduct => -1.0,
    };

    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
    for (id, row) in data.iter_rows().enumerate() {
        let cand = Candidate {
            key: sign * kernel.score(metric, query, row),
            id,
        };
        if heap.len() < k {
            heap.push(cand);
        } else if let Some(worst) = heap.peek() {
            if cand < *worst {
                heap.pop();
                heap.push(cand);
            }
        }
    }

    let sorted = heap.into_sorted_vec();
    for slot in 0..k {
        match sorted.get(slot) {
            Some(c) => {
                dist_out[slot] = sign * c.key;
                id_out[slot] = c.id as i64;
            }
            None => {
                dist_out[slot] = metric.worst();
                id_out[slot] = -1;
            }
        }
    }
}

fn check_shapes(query: &Matrix<f32>, data: &Matrix<f32>) -> Result<()> {
    if !data.is_empty() && !query.is_empty() && query.cols() != data.cols() {
        return Err(Error::Shape(format!(
            "query dimension {} does not match corpus dimension {}",
            query.cols(),
            data.cols()
        )));
    }
    Ok(())
}

/// Sequential exact search.
pub fn exact_knn(
    query: &Matrix<f32>,
    data: &Matrix<f32>,
    k: usize,
    metric: MetricType,
    kernel: Kernel,
) -> Result<Neighbors> {
    check_shapes(query, data)?;
    let nq = query.rows();
    let mut distances = Matrix::filled(nq, k, 0f32);
    let mut ids = Matrix::filled(nq, k, 0i64);
    if k == 0 {
        return Ok(Neighbors { distances, ids });
    }
    for (i, (d, n)) in distances
        .as_mut_slice()
        .chunks_exact_mut(k)
        .zip(ids.as_mut_slice().chunks_exact_mut(k))
        .enumerate()
    {
        search_row(query.row(i), data, k, metric, kernel, d, n);
    }
    Ok(Neighbors { distances, ids })
}

/// Exact search with queries spread over the rayon pool.
#[cfg(feature = "parallel")]
pub fn exact_knn_parallel(
    query: &Matrix<f32>,
    data: &Matrix<f32>,
    k: usize,
    metric: MetricType,
    kernel: Kernel,
) -> Result<Neighbors> {
    check_shapes(query, data)?;
    let nq = query.rows();
    let mut distances = Matrix::filled(nq, k, 0f32);
    let mut ids = Matrix::filled(nq, k, 0i64);
    if k == 0 {
        return Ok(Neighbors { distances, ids });
    }
    distances
        .as_mut_slice()
        .par_chunks_exact_mut(k)
        .zip(ids.as_mut_slice().par_chunks_exact_mut(k))
        .enumerate()
        .for_each(|(i, (d, n))| search_row(query.row(i), data, k, metric, kernel, d, n));
    Ok(Neighbors { distances, ids })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Matrix<f32> {
        // Points on a line at x = 0, 1, 2, ...
        Matrix::from_vec((0..n).flat_map(|i| [i as f32, 0.0]).collect(), n, 2).unwrap()
    }

    #[test]
    fn test_l2_orders_ascending() {
        let data = line(10);
        let q = Matrix::from_vec(vec![3.2, 0.0], 1, 2).unwrap();
        let r = exact_knn(&q, &data, 3, MetricType::L2, Kernel::Scalar).unwrap();
        assert_eq!(r.ids.row(0), &[3, 4, 2]);
        assert!(r.distances.row(0).windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ip_orders_descending() {
        let data = line(10);
        let q = Matrix::from_vec(vec![1.0, 0.0], 1, 2).unwrap();
        let r = exact_knn(&q, &data, 3, MetricType::InnerProduct, Kernel::Simd).unwrap();
        assert_eq!(r.ids.row(0), &[9, 8, 7]);
        assert_eq!(r.distances.row(0), &[9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_ties_prefer_lower_id() {
        let data = Matrix::filled(5, 2, 1.0f32);
        let q = Matrix::from_vec(vec![0.0, 0.0], 1, 2).unwrap();
        let r = exact_knn(&q, &data, 3, MetricType::L2, Kernel::Scalar).unwrap();
        assert_eq!(r.ids.row(0), &[0, 1, 2]);
    }

    #[test]
    fn test_short_corpus_is_padded() {
        let data = line(2);
        let q = Matrix::from_vec(vec![0.0, 0.0], 1, 2).unwrap();
        let r = exact_knn(&q, &data, 4, MetricType::L2, Kernel::Scalar).unwrap();
        assert_eq!(r.ids.row(0), &[0, 1, -1, -1]);
        assert_eq!(r.distances.row(0)[3], f32::INFINITY);

        let r = exact_knn(&q, &data, 4, MetricType::InnerProduct, Kernel::Scalar).unwrap();
        assert_eq!(r.ids.row(0)[2], -1);
        assert_eq!(r.distances.row(0)[2], f32::NEG_INFINITY);
    }

    #[test]
    fn test_dimension_mismatch() {
        let q = Matrix::from_vec(vec![0.0; 3], 1, 3).unwrap();
        assert!(matches!(
            exact_knn(&q, &line(4), 1, MetricType::L2, Kernel::Scalar),
            Err(Error::Shape(_))
        ));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        use rand::Rng;
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let data: Vec<f32> = (0..200 * 16).map(|_| rng.gen()).collect();
        let data = Matrix::from_vec(data, 200, 16).unwrap();
        let q = data.head(20);
        for metric in [MetricType::L2, MetricType::InnerProduct] {
            let a = exact_knn(&q, &data, 10, metric, Kernel::Simd).unwrap();
            let b = exact_knn_parallel(&q, &data, 10, metric, Kernel::Simd).unwrap();
            assert_eq!(a.ids, b.ids);
        }
    }
}
