//! Built-in engines and the factory that selects between them.

mod flat;
#[cfg(feature = "usearch")]
mod usearch;

pub use flat::FlatIndex;
#[cfg(feature = "usearch")]
pub use self::usearch::UsearchIndex;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::{IndexFactory, IndexUnderTest};
use crate::matrix::Matrix;
use crate::metric::MetricType;

/// Number of warmup searches issued before timing starts.
pub const WARMUP_ROUNDS: usize = 3;
/// Queries per warmup search.
pub const WARMUP_QUERIES: usize = 10;
/// Neighbors requested per warmup search.
pub const WARMUP_K: usize = 10;
/// Rows in the scratch index built by `verify`.
pub const VERIFY_ROWS: usize = 100;

/// `rows × dimension` uniform vectors, L2-normalized.
pub(crate) fn random_unit_rows(rows: usize, dimension: usize, seed: u64) -> Result<Matrix<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<f32> = (0..rows * dimension).map(|_| rng.gen::<f32>()).collect();
    let mut m = Matrix::from_vec(data, rows, dimension)?;
    m.normalize_rows();
    Ok(m)
}

/// [`WARMUP_ROUNDS`] searches of [`WARMUP_QUERIES`] unit queries at
/// depth [`WARMUP_K`].
pub(crate) fn warmup_searches(index: &dyn IndexUnderTest) -> anyhow::Result<()> {
    for round in 0..WARMUP_ROUNDS {
        let queries = random_unit_rows(WARMUP_QUERIES, index.dimension(), round as u64)?;
        index.search(&queries, WARMUP_K)?;
    }
    Ok(())
}

/// Builds a scratch index on [`VERIFY_ROWS`] unit vectors and checks that
/// the first three rows find themselves.
///
/// Under inner product this is only meaningful for a few dimensions or more.
/// In one dimension every positive unit row is `[1.0]`, all scores tie and
/// lower ids win, so the check reports `false`.
pub(crate) fn self_retrieval_check(index: &mut dyn IndexUnderTest) -> anyhow::Result<bool> {
    let data = random_unit_rows(VERIFY_ROWS, index.dimension(), 7)?;
    index.train(&data)?;
    index.add(&data)?;
    let found = index.search(&data.head(3), 1)?;
    let ok = found.ids.column(0) == [0, 1, 2];
    debug!(engine = index.name(), ok, "Self-retrieval check");
    Ok(ok)
}

/// Factory for the engines shipped with this crate.
///
/// | tag    | engine                          |
/// |--------|---------------------------------|
/// | `flat` | [`FlatIndex`]                   |
/// | `hnsw` | `UsearchIndex` (feature `usearch`) |
#[derive(Debug, Default)]
pub struct EngineFactory {
    simd_level: Option<&'static str>,
}

impl EngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// SIMD level recorded by `setup`, if it ran.
    pub fn simd_level(&self) -> Option<&'static str> {
        self.simd_level
    }
}

impl IndexFactory for EngineFactory {
    fn setup(&mut self) -> anyhow::Result<()> {
        if self.simd_level.is_none() {
            let level = annb_core::distance::simd_level();
            info!(simd = level, "Engine factory ready");
            self.simd_level = Some(level);
        }
        Ok(())
    }

    fn create(
        &self,
        name: &str,
        dimension: usize,
        metric: MetricType,
        config: &EngineConfig,
    ) -> anyhow::Result<Box<dyn IndexUnderTest>> {
        match config.index.to_lowercase().as_str() {
            "flat" => Ok(Box::new(
                FlatIndex::new(name, dimension, metric).with_parallel(config.accelerate),
            )),
            #[cfg(feature = "usearch")]
            "hnsw" => Ok(Box::new(UsearchIndex::new(name, dimension, metric, config)?)),
            other => Err(Error::UnsupportedEngine(other.to_string()).into()),
        }
    }
}
