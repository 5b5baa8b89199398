//! Exact ground truth through an ordered chain of kNN backends.
//!
//! Backends are probed in declaration order and the first available one
//! answers. There is no degraded fallback: an exhausted chain is an error.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::knn::{self, Kernel, Neighbors};
use crate::matrix::Matrix;
use crate::metric::MetricType;

/// Neighbors computed per query.
pub const GROUND_TRUTH_DEPTH: usize = 100;

/// Only this many leading query rows receive ground truth.
pub const MAX_GROUND_TRUTH_QUERIES: usize = 16384;

/// One exact nearest-neighbor provider.
pub trait ExactKnnBackend: Send + Sync {
    /// Identifier embedded in the stage name.
    fn name(&self) -> &str;

    /// Cheap probe. Must not allocate session resources more than once.
    fn is_available(&self) -> bool;

    fn knn(
        &self,
        query: &Matrix<f32>,
        data: &Matrix<f32>,
        k: usize,
        metric: MetricType,
    ) -> Result<Neighbors>;
}

/// Rayon-parallel search over SIMD kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceleratedBackend;

impl ExactKnnBackend for AcceleratedBackend {
    fn name(&self) -> &str {
        "accelerated"
    }

    #[cfg(feature = "parallel")]
    fn is_available(&self) -> bool {
        rayon::current_num_threads() > 1 || annb_core::distance::variant().is_accelerated()
    }

    #[cfg(not(feature = "parallel"))]
    fn is_available(&self) -> bool {
        false
    }

    #[cfg(feature = "parallel")]
    fn knn(
        &self,
        query: &Matrix<f32>,
        data: &Matrix<f32>,
        k: usize,
        metric: MetricType,
    ) -> Result<Neighbors> {
        knn::exact_knn_parallel(query, data, k, metric, Kernel::Simd)
    }

    #[cfg(not(feature = "parallel"))]
    fn knn(
        &self,
        query: &Matrix<f32>,
        data: &Matrix<f32>,
        k: usize,
        metric: MetricType,
    ) -> Result<Neighbors> {
        knn::exact_knn(query, data, k, metric, Kernel::Simd)
    }
}

/// Single-threaded scalar search. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl ExactKnnBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn knn(
        &self,
        query: &Matrix<f32>,
        data: &Matrix<f32>,
        k: usize,
        metric: MetricType,
    ) -> Result<Neighbors> {
        knn::exact_knn(query, data, k, metric, Kernel::Scalar)
    }
}

/// Exact search through the usearch library.
#[cfg(feature = "usearch")]
#[derive(Debug, Default, Clone, Copy)]
pub struct UsearchBackend;

#[cfg(feature = "usearch")]
impl ExactKnnBackend for UsearchBackend {
    fn name(&self) -> &str {
        "usearch"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn knn(
        &self,
        query: &Matrix<f32>,
        data: &Matrix<f32>,
        k: usize,
        metric: MetricType,
    ) -> Result<Neighbors> {
        use usearch::{new_index, IndexOptions, MetricKind, ScalarKind};

        let stage = "generate_groundtruth/usearch";
        let options = IndexOptions {
            dimensions: data.cols(),
            metric: match metric {
                MetricType::L2 => MetricKind::L2sq,
                MetricType::InnerProduct => MetricKind::IP,
            },
            quantization: ScalarKind::F32,
            connectivity: 0,
            expansion_add: 0,
            expansion_search: 0,
            multi: false,
        };
        let index = new_index(&options).map_err(|e| Error::engine(stage, e.into()))?;
        index
            .reserve(data.rows())
            .map_err(|e| Error::engine(stage, e.into()))?;
        for (i, row) in data.iter_rows().enumerate() {
            index
                .add(i as u64, row)
                .map_err(|e| Error::engine(stage, e.into()))?;
        }

        let mut distances = Matrix::filled(query.rows(), k, metric.worst());
        let mut ids = Matrix::filled(query.rows(), k, -1i64);
        for i in 0..query.rows() {
            let found = index
                .exact_search(query.row(i), k)
                .map_err(|e| Error::engine(stage, e.into()))?;
            for (slot, (key, dist)) in found.keys.iter().zip(&found.distances).enumerate() {
                ids.row_mut(i)[slot] = *key as i64;
                // usearch reports inner product as 1 - dot.
                distances.row_mut(i)[slot] = match metric {
                    MetricType::L2 => *dist,
                    MetricType::InnerProduct => 1.0 - *dist,
                };
            }
        }
        Ok(Neighbors { distances, ids })
    }
}

/// Default chain: accelerated, then cpu, then usearch when compiled in.
pub fn default_backends() -> Vec<Box<dyn ExactKnnBackend>> {
    #[allow(unused_mut)]
    let mut chain: Vec<Box<dyn ExactKnnBackend>> =
        vec![Box::new(AcceleratedBackend), Box::new(CpuBackend)];
    #[cfg(feature = "usearch")]
    chain.push(Box::new(UsearchBackend));
    chain
}

/// Computes exact top-k ground truth over a bounded query prefix.
pub struct GroundTruthGenerator {
    backends: Vec<Box<dyn ExactKnnBackend>>,
    depth: usize,
    max_queries: usize,
}

impl Default for GroundTruthGenerator {
    fn default() -> Self {
        Self::new(default_backends())
    }
}

impl GroundTruthGenerator {
    pub fn new(backends: Vec<Box<dyn ExactKnnBackend>>) -> Self {
        Self {
            backends,
            depth: GROUND_TRUTH_DEPTH,
            max_queries: MAX_GROUND_TRUTH_QUERIES,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries;
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_queries(&self) -> usize {
        self.max_queries
    }

    /// First backend whose probe succeeds.
    pub fn select(&self) -> Result<&dyn ExactKnnBackend> {
        let mut tried = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let available = backend.is_available();
            debug!(backend = backend.name(), available, "Probed ground-truth backend");
            if available {
                return Ok(backend.as_ref());
            }
            tried.push(backend.name().to_string());
        }
        Err(Error::NoBackendAvailable { tried })
    }

    /// Exact neighbors of `query[..max_queries]` within `data`.
    pub fn generate(
        &self,
        query: &Matrix<f32>,
        data: &Matrix<f32>,
        metric: MetricType,
    ) -> Result<Neighbors> {
        let backend = self.select()?;
        let query = query.head(self.max_queries);

        let stage = format!("generate_groundtruth/{}", backend.name());
        let start = Instant::now();
        let result = backend.knn(&query, data, self.depth, metric)?;
        info!(
            "Stage: {}, duration: {:.3}ms (nq={}, nb={}, k={})",
            stage,
            start.elapsed().as_secs_f64() * 1000.0,
            query.rows(),
            data.rows(),
            self.depth
        );
        Ok(result)
    }
}

/// Ground truth at the default depth through the default chain.
pub fn generate_groundtruth(
    query: &Matrix<f32>,
    data: &Matrix<f32>,
    metric: MetricType,
) -> Result<Neighbors> {
    GroundTruthGenerator::default().generate(query, data, metric)
}
