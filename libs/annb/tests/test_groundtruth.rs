//! Ground-truth generation through the backend chain.

mod common;

use annb::groundtruth::{
    default_backends, AcceleratedBackend, CpuBackend, ExactKnnBackend, GROUND_TRUTH_DEPTH,
};
use annb::{generate_groundtruth, Error, GroundTruthGenerator, Matrix, MetricType, Neighbors};
use common::random_matrix;

struct Missing;

impl ExactKnnBackend for Missing {
    fn name(&self) -> &str {
        "knn_gpu"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn knn(&self, _: &Matrix<f32>, _: &Matrix<f32>, _: usize, _: MetricType) -> annb::Result<Neighbors> {
        unreachable!("unavailable backend must not be called")
    }
}

#[test]
fn self_query_l2_scenario() {
    let data = random_matrix(1000, 128, 42);
    let gt = generate_groundtruth(&data, &data, MetricType::L2).unwrap();

    assert_eq!(gt.ids.shape(), (1000, GROUND_TRUTH_DEPTH));
    assert_eq!(gt.distances.shape(), (1000, GROUND_TRUTH_DEPTH));
    assert!(gt.ids.as_slice().iter().all(|&id| (0..1000).contains(&id)));
    assert_eq!(gt.ids.column(0), (0..1000).collect::<Vec<i64>>());
    assert!(gt.distances.column(0).iter().all(|&d| d == 0.0));
}

#[test]
fn self_query_first_column_is_identity_for_all_sizes() {
    for n in [1, 7, 100, 250] {
        let data = random_matrix(n, 16, n as u64);
        let gt = GroundTruthGenerator::default().generate(&data, &data, MetricType::L2).unwrap();
        assert_eq!(gt.ids.column(0), (0..n as i64).collect::<Vec<_>>(), "n = {}", n);
    }
}

#[test]
fn short_corpus_is_padded() {
    let data = random_matrix(10, 4, 1);
    let gt = generate_groundtruth(&data, &data, MetricType::InnerProduct).unwrap();
    assert_eq!(gt.depth(), GROUND_TRUTH_DEPTH);
    assert!(gt.ids.row(0)[10..].iter().all(|&id| id == -1));
    assert!(gt.distances.row(0)[10..].iter().all(|&d| d == f32::NEG_INFINITY));
}

#[test]
fn backends_agree() {
    let data = random_matrix(300, 32, 3);
    let query = random_matrix(20, 32, 4);
    for metric in [MetricType::L2, MetricType::InnerProduct] {
        let cpu = CpuBackend.knn(&query, &data, 10, metric).unwrap();
        let fast = AcceleratedBackend.knn(&query, &data, 10, metric).unwrap();
        // Kernels may round differently, so compare scores rather than ids.
        for (a, b) in cpu.distances.as_slice().iter().zip(fast.distances.as_slice()) {
            assert!((a - b).abs() < 1e-3, "{}: {} vs {}", metric, a, b);
        }
    }
}

#[test]
fn fallback_skips_unavailable() {
    let gen = GroundTruthGenerator::new(vec![Box::new(Missing), Box::new(CpuBackend)]).with_depth(5);
    assert_eq!(gen.select().unwrap().name(), "cpu");

    let data = random_matrix(50, 8, 9);
    let gt = gen.generate(&data, &data, MetricType::L2).unwrap();
    assert_eq!(gt.ids.shape(), (50, 5));
}

#[test]
fn exhausted_chain_fails() {
    let gen = GroundTruthGenerator::new(vec![Box::new(Missing)]);
    let data = random_matrix(5, 2, 0);
    match gen.generate(&data, &data, MetricType::L2) {
        Err(Error::NoBackendAvailable { tried }) => assert_eq!(tried, vec!["knn_gpu".to_string()]),
        other => panic!("unexpected {:?}", other.map(|n| n.len())),
    }
}

#[test]
fn default_chain_order() {
    let names: Vec<String> = default_backends().iter().map(|b| b.name().to_string()).collect();
    assert_eq!(&names[..2], &["accelerated".to_string(), "cpu".to_string()]);
}
