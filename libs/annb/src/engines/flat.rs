//! Exact brute-force engine, used as a baseline and for smoke tests.

use anyhow::{bail, Result};

use super::{self_retrieval_check, warmup_searches};
use crate::index::IndexUnderTest;
use crate::knn::{self, Kernel, Neighbors};
use crate::matrix::Matrix;
use crate::metric::MetricType;

/// Stores vectors verbatim and scans all of them per query.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    name: String,
    dimension: usize,
    metric: MetricType,
    vectors: Matrix<f32>,
    parallel: bool,
}

impl FlatIndex {
    pub fn new(name: &str, dimension: usize, metric: MetricType) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            metric,
            vectors: Matrix::filled(0, dimension, 0.0),
            parallel: false,
        }
    }

    /// Spread queries over the rayon pool. No effect without the `parallel`
    /// feature.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn len(&self) -> usize {
        self.vectors.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn check_dimension(&self, stage: &str, m: &Matrix<f32>) -> Result<()> {
        if m.cols() != self.dimension {
            bail!(
                "{}: expected {}-dimensional vectors, got {}",
                stage,
                self.dimension,
                m.cols()
            );
        }
        Ok(())
    }
}

impl IndexUnderTest for FlatIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> MetricType {
        self.metric
    }

    fn verify(&self) -> Result<bool> {
        let mut scratch = FlatIndex::new(&self.name, self.dimension, self.metric);
        self_retrieval_check(&mut scratch)
    }

    fn train(&mut self, data: &Matrix<f32>) -> Result<()> {
        self.check_dimension("train", data)
    }

    fn add(&mut self, data: &Matrix<f32>) -> Result<()> {
        self.check_dimension("add", data)?;
        self.vectors.extend_rows(data)?;
        Ok(())
    }

    fn search(&self, query: &Matrix<f32>, k: usize) -> Result<Neighbors> {
        self.check_dimension("search", query)?;
        #[cfg(feature = "parallel")]
        if self.parallel {
            return Ok(knn::exact_knn_parallel(
                query,
                &self.vectors,
                k,
                self.metric,
                Kernel::Simd,
            )?);
        }
        Ok(knn::exact_knn(query, &self.vectors, k, self.metric, Kernel::Simd)?)
    }

    fn warmup(&mut self) -> Result<()> {
        warmup_searches(&*self)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.vectors = Matrix::filled(0, self.dimension, 0.0);
        Ok(())
    }
}
