//! Capability contract for engines under test.
//!
//! The runner drives every engine through the same lifecycle:
//! `create -> [verify] -> train -> add -> [update_search_args] -> warmup ->
//! search*` and finally `cleanup`. Engine failures are opaque
//! (`anyhow::Error`); the runner attaches the lifecycle stage.

use crate::config::{EngineConfig, SearchArgs};
use crate::knn::Neighbors;
use crate::matrix::Matrix;
use crate::metric::MetricType;

/// An ANN index being benchmarked.
pub trait IndexUnderTest {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn metric(&self) -> MetricType;

    /// Cheap correctness smoke test on small synthetic data.
    fn verify(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn train(&mut self, data: &Matrix<f32>) -> anyhow::Result<()>;

    fn add(&mut self, data: &Matrix<f32>) -> anyhow::Result<()>;

    /// Top-`k` neighbors per query row.
    fn search(&self, query: &Matrix<f32>, k: usize) -> anyhow::Result<Neighbors>;

    /// Called once before timed searches.
    fn warmup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release engine resources. The index is not used afterwards.
    fn cleanup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Change run-time search parameters without rebuilding.
    fn update_search_args(&mut self, _args: &SearchArgs) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Creates indexes. One factory serves a whole benchmarking session.
pub trait IndexFactory {
    /// One-time, session-wide initialization.
    fn setup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn create(
        &self,
        name: &str,
        dimension: usize,
        metric: MetricType,
        config: &EngineConfig,
    ) -> anyhow::Result<Box<dyn IndexUnderTest>>;
}
