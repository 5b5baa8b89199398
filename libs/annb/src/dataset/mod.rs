//! Corpus providers backed by cache files.
//!
//! A dataset exposes its shape up front and materializes arrays lazily: the
//! first accessor call reads the array from the store, later calls return
//! the same in-memory copy.

mod cached;
mod random;

pub use cached::{CachedDataset, CreateOptions, Schema};
pub use random::RandomDataset;

use std::cell::OnceCell;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matrix::Matrix;
use crate::metric::MetricType;

/// Uniform read access to a benchmark corpus.
pub trait Dataset {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn count(&self) -> usize;

    fn metric(&self) -> MetricType;

    /// Whether corpus rows are L2-normalized.
    fn normalize(&self) -> bool;

    /// Corpus, `count × dimension`.
    fn data(&self) -> Result<&Matrix<f32>>;

    /// Queries, one per ground-truth row.
    fn query_data(&self) -> Result<&Matrix<f32>>;

    /// Exact neighbor ids, `truth_rows × truth_depth`.
    fn ground_truth(&self) -> Result<&Matrix<i64>>;

    /// Rows of ground truth, known without reading the array.
    fn truth_rows(&self) -> usize;

    /// Neighbors per ground-truth row, known without reading the array.
    fn truth_depth(&self) -> usize;
}

/// Identity of a synthetic generation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub dimension: usize,
    pub count: usize,
    pub metric: MetricType,
    pub normalize: bool,
}

impl Fingerprint {
    pub fn new(dimension: usize, count: usize, metric: MetricType, normalize: bool) -> Self {
        Self {
            dimension,
            count,
            metric,
            normalize,
        }
    }

    /// Fingerprint described by an opened dataset.
    pub fn of(dataset: &dyn Dataset) -> Self {
        Self::new(
            dataset.dimension(),
            dataset.count(),
            dataset.metric(),
            dataset.normalize(),
        )
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(dimension={}, count={}, metric={}, normalize={})",
            self.dimension, self.count, self.metric, self.normalize
        )
    }
}

// `OnceCell::get_or_try_init` is unstable.
pub(crate) fn memo<T>(cell: &OnceCell<T>, load: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = load()?;
    Ok(cell.get_or_init(|| value))
}
