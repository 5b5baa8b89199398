//! Datasets read from (and written to) store files.
//!
//! Two schemas are recognized:
//!
//! - **Canonical**: arrays `train`, `test`, `neighbors`, `distances` and the
//!   `distance` attribute (`euclidean` or `angular`). This is what
//!   [`CachedDataset::create`] and synthetic generation write, together with
//!   the fingerprint attributes and the `done` marker.
//! - **Legacy** (read-only): arrays `data`, `ground_truth`, optional
//!   `query_data` / `query` and `training_data`, attributes `dimension`,
//!   `count`, `metric`, `normalize`, `done`.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::info;

use super::{memo, Dataset, Fingerprint};
use crate::error::{Error, Result};
use crate::groundtruth::GroundTruthGenerator;
use crate::knn::Neighbors;
use crate::matrix::Matrix;
use crate::metric::MetricType;
use crate::store::{ArrayInfo, AttrValue, StoreFile, StoreWriter};

/// Default size of the test split carved from the training rows.
pub const DEFAULT_TEST_SIZE: usize = 10_000;

/// Layout of an opened file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schema {
    Canonical,
    Legacy,
}

/// Options for [`CachedDataset::create`].
#[derive(Debug, Default)]
pub struct CreateOptions {
    /// Explicit query split. Defaults to the first `min(N, 10000)` rows of
    /// the training data.
    pub test: Option<Matrix<f32>>,
    /// Precomputed ground truth for `test`. Ignored when `test` is absent.
    pub neighbors: Option<Neighbors>,
    /// L2-normalize train (and an explicit test split). Inner product only.
    pub normalize: bool,
    /// When false and no neighbors are given, an `N×1` zero placeholder is
    /// written instead of real ground truth.
    pub skip_ground_truth: bool,
    /// Additional attributes written as-is.
    pub extra_attrs: BTreeMap<String, AttrValue>,
}

/// Dataset over a store file in either schema.
pub struct CachedDataset {
    store: StoreFile,
    schema: Schema,
    name: String,
    dimension: usize,
    count: usize,
    metric: MetricType,
    normalize: bool,
    truth_rows: usize,
    truth_depth: usize,
    data: OnceCell<Matrix<f32>>,
    training_data: OnceCell<Matrix<f32>>,
    query: OnceCell<Matrix<f32>>,
    neighbors: OnceCell<Matrix<i64>>,
    distances: OnceCell<Matrix<f32>>,
}

fn require_array<'a>(store: &'a StoreFile, name: &str) -> Result<&'a ArrayInfo> {
    store.array_info(name).ok_or_else(|| {
        Error::cache_invalid(store.path(), format!("dataset file has no `{}` array", name))
    })
}

fn attr_usize(store: &StoreFile, name: &str) -> Result<Option<usize>> {
    match store.attr(name) {
        None => Ok(None),
        Some(value) => value
            .as_int()
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                Error::cache_invalid(
                    store.path(),
                    format!("attribute `{}` is not a non-negative integer: {}", name, value),
                )
            }),
    }
}

impl CachedDataset {
    /// Open and validate a store file.
    ///
    /// Fails with `NotFound` when the file is missing and `CacheInvalid`
    /// naming the first missing attribute or array.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = StoreFile::open(path)?;
        let canonical = store.attr("distance").is_some() || store.has_array("train");
        if canonical {
            Self::open_canonical(store)
        } else {
            Self::open_legacy(store)
        }
    }

    fn open_canonical(store: StoreFile) -> Result<Self> {
        let distance = store
            .attr("distance")
            .ok_or_else(|| Error::cache_invalid(store.path(), "dataset file has no `distance` attribute"))?
            .as_text()
            .ok_or_else(|| Error::cache_invalid(store.path(), "attribute `distance` is not text"))?;
        let metric = MetricType::from_distance_text(distance)?;

        for name in ["distances", "neighbors", "test", "train"] {
            require_array(&store, name)?;
        }
        let train = require_array(&store, "train")?.shape;
        let test = require_array(&store, "test")?.shape;
        let neighbors = require_array(&store, "neighbors")?.shape;
        let distances = require_array(&store, "distances")?.shape;

        let dimension = attr_usize(&store, "dimension")?.unwrap_or(train[1]);
        let count = attr_usize(&store, "count")?.unwrap_or(train[0]);
        let normalize = store
            .attr("normalized")
            .or_else(|| store.attr("normalize"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if train != [count, dimension] {
            return Err(Error::cache_invalid(
                store.path(),
                format!("train is {}x{}, attributes say {}x{}", train[0], train[1], count, dimension),
            ));
        }
        if test[1] != dimension {
            return Err(Error::cache_invalid(
                store.path(),
                format!("test has dimension {}, expected {}", test[1], dimension),
            ));
        }
        if neighbors[0] != test[0] || distances != neighbors {
            return Err(Error::cache_invalid(
                store.path(),
                format!(
                    "ground truth shape {}x{} / {}x{} does not match {} test rows",
                    neighbors[0], neighbors[1], distances[0], distances[1], test[0]
                ),
            ));
        }

        Ok(Self::new(store, Schema::Canonical, dimension, count, metric, normalize, neighbors))
    }

    fn open_legacy(store: StoreFile) -> Result<Self> {
        let data = require_array(&store, "data")?.shape;
        let truth = require_array(&store, "ground_truth")?.shape;
        // Legacy files cannot be regenerated here, so an unfinished one is unusable.
        if store.attr("done").and_then(|v| v.as_bool()) != Some(true) {
            return Err(Error::cache_invalid(store.path(), "completion marker not set"));
        }

        let dimension = attr_usize(&store, "dimension")?.unwrap_or(data[1]);
        let count = attr_usize(&store, "count")?.unwrap_or(data[0]);
        let metric = match store.attr("metric") {
            Some(value) => {
                let text = value.as_text().ok_or_else(|| {
                    Error::cache_invalid(store.path(), "attribute `metric` is not text")
                })?;
                MetricType::from_text(text)?
            }
            None => MetricType::L2,
        };
        let normalize = store
            .attr("normalize")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        if data != [count, dimension] {
            return Err(Error::cache_invalid(
                store.path(),
                format!("data is {}x{}, attributes say {}x{}", data[0], data[1], count, dimension),
            ));
        }
        let query_rows = match ["query_data", "query"]
            .iter()
            .find_map(|name| store.array_info(name))
        {
            Some(info) => {
                if info.shape[1] != dimension {
                    return Err(Error::cache_invalid(
                        store.path(),
                        format!("query has dimension {}, expected {}", info.shape[1], dimension),
                    ));
                }
                info.shape[0]
            }
            None => truth[0].min(count),
        };
        if query_rows != truth[0] {
            return Err(Error::cache_invalid(
                store.path(),
                format!("{} query rows but {} ground-truth rows", query_rows, truth[0]),
            ));
        }

        Ok(Self::new(store, Schema::Legacy, dimension, count, metric, normalize, truth))
    }

    fn new(
        store: StoreFile,
        schema: Schema,
        dimension: usize,
        count: usize,
        metric: MetricType,
        normalize: bool,
        truth: [usize; 2],
    ) -> Self {
        let name = store
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            store,
            schema,
            name,
            dimension,
            count,
            metric,
            normalize,
            truth_rows: truth[0],
            truth_depth: truth[1],
            data: OnceCell::new(),
            training_data: OnceCell::new(),
            query: OnceCell::new(),
            neighbors: OnceCell::new(),
            distances: OnceCell::new(),
        }
    }

    /// Write a canonical dataset and open it.
    pub fn create(
        path: impl AsRef<Path>,
        metric: MetricType,
        train: Matrix<f32>,
        options: CreateOptions,
    ) -> Result<Self> {
        Self::create_with(path, metric, train, options, &GroundTruthGenerator::default())
    }

    /// [`create`](Self::create) with an explicit ground-truth generator.
    pub fn create_with(
        path: impl AsRef<Path>,
        metric: MetricType,
        mut train: Matrix<f32>,
        options: CreateOptions,
        generator: &GroundTruthGenerator,
    ) -> Result<Self> {
        let CreateOptions {
            test,
            neighbors,
            normalize,
            skip_ground_truth,
            mut extra_attrs,
        } = options;

        if normalize && metric == MetricType::L2 {
            return Err(Error::InvalidConfig(
                "normalize is only supported for the inner product metric".into(),
            ));
        }
        if normalize && neighbors.is_some() {
            return Err(Error::InvalidConfig(
                "normalize is set, but precomputed neighbors were given".into(),
            ));
        }
        if train.is_empty() {
            return Err(Error::Shape("training data is empty".into()));
        }

        if normalize {
            train.normalize_rows();
        }
        let (test, neighbors) = match test {
            None => (train.head(DEFAULT_TEST_SIZE), None),
            Some(mut test) => {
                if test.cols() != train.cols() {
                    return Err(Error::Shape(format!(
                        "test has dimension {}, train has {}",
                        test.cols(),
                        train.cols()
                    )));
                }
                if normalize {
                    test.normalize_rows();
                }
                (test, neighbors)
            }
        };

        let (test, truth) = match neighbors {
            Some(given) => {
                if given.len() != test.rows() {
                    return Err(Error::Shape(format!(
                        "{} ground-truth rows for {} test rows",
                        given.len(),
                        test.rows()
                    )));
                }
                (test, given)
            }
            None if skip_ground_truth => {
                let placeholder = Neighbors {
                    distances: Matrix::filled(test.rows(), 1, 0.0),
                    ids: Matrix::filled(test.rows(), 1, 0),
                };
                (test, placeholder)
            }
            None => {
                // Ground truth covers a bounded prefix; keep the split aligned.
                let truth = generator.generate(&test, &train, metric)?;
                (test.head(truth.len()), truth)
            }
        };

        extra_attrs
            .entry("normalized".into())
            .or_insert(AttrValue::Bool(normalize));
        let path = path.as_ref();
        write_canonical(path, metric, &train, &test, &truth, extra_attrs)?;
        info!(path = %path.display(), rows = train.rows(), queries = test.rows(), "Wrote dataset");
        Self::open(path)
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Raw attribute access.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.store.attr(name)
    }

    pub fn store(&self) -> &StoreFile {
        &self.store
    }

    /// Completion marker written after all arrays.
    pub fn is_done(&self) -> bool {
        self.store
            .attr("done")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Corpus rows (`train` in canonical files, `data` in legacy ones).
    pub fn train(&self) -> Result<&Matrix<f32>> {
        memo(&self.data, || match self.schema {
            Schema::Canonical => self.store.read_f32("train"),
            Schema::Legacy => self.store.read_f32("data"),
        })
    }

    /// Rows used for training. Legacy files may carry a separate
    /// `training_data` array; otherwise this is the corpus.
    pub fn training_data(&self) -> Result<&Matrix<f32>> {
        if self.schema == Schema::Legacy && self.store.has_array("training_data") {
            return memo(&self.training_data, || self.store.read_f32("training_data"));
        }
        self.train()
    }

    /// Query rows (`test` in canonical files).
    pub fn test(&self) -> Result<&Matrix<f32>> {
        memo(&self.query, || match self.schema {
            Schema::Canonical => self.store.read_f32("test"),
            Schema::Legacy => {
                for name in ["query_data", "query"] {
                    if self.store.has_array(name) {
                        return self.store.read_f32(name);
                    }
                }
                match self.data.get() {
                    Some(data) => Ok(data.head(self.truth_rows)),
                    None => self.store.read_f32_head("data", self.truth_rows),
                }
            }
        })
    }

    pub fn ground_truth_neighbors(&self) -> Result<&Matrix<i64>> {
        memo(&self.neighbors, || match self.schema {
            Schema::Canonical => self.store.read_i64("neighbors"),
            Schema::Legacy => self.store.read_i64("ground_truth"),
        })
    }

    /// Distances of the ground-truth neighbors. Legacy files have none.
    pub fn ground_truth_distances(&self) -> Result<&Matrix<f32>> {
        memo(&self.distances, || match self.schema {
            Schema::Canonical => self.store.read_f32("distances"),
            Schema::Legacy => Err(Error::cache_invalid(
                self.store.path(),
                "legacy dataset file has no ground-truth distances",
            )),
        })
    }
}

/// Write a canonical file. Fingerprint attributes are derived from `train`;
/// `done` is set last.
pub(crate) fn write_canonical(
    path: &Path,
    metric: MetricType,
    train: &Matrix<f32>,
    test: &Matrix<f32>,
    truth: &Neighbors,
    extra_attrs: BTreeMap<String, AttrValue>,
) -> Result<()> {
    let mut writer = StoreWriter::create(path)?;
    writer.set_attr("distance", metric.distance_text());
    writer.set_attr("metric", metric.as_str());
    writer.set_attr("dimension", train.cols());
    writer.set_attr("count", train.rows());
    for (name, value) in extra_attrs {
        writer.set_attr(&name, value);
    }
    writer.write_f32("train", train)?;
    writer.write_f32("test", test)?;
    writer.write_i64("neighbors", &truth.ids)?;
    writer.write_f32("distances", &truth.distances)?;
    writer.set_attr("done", true);
    writer.finish()
}

impl Dataset for CachedDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.count
    }

    fn metric(&self) -> MetricType {
        self.metric
    }

    fn normalize(&self) -> bool {
        self.normalize
    }

    fn data(&self) -> Result<&Matrix<f32>> {
        self.train()
    }

    fn query_data(&self) -> Result<&Matrix<f32>> {
        self.test()
    }

    fn ground_truth(&self) -> Result<&Matrix<i64>> {
        self.ground_truth_neighbors()
    }

    fn truth_rows(&self) -> usize {
        self.truth_rows
    }

    fn truth_depth(&self) -> usize {
        self.truth_depth
    }
}

impl fmt::Display for CachedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<CachedDataset({}, m={}, d={}, nb={}, normalized={})>",
            self.name,
            self.metric.label(),
            self.dimension,
            self.count,
            self.normalize
        )
    }
}

impl fmt::Debug for CachedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedDataset")
            .field("path", &self.store.path())
            .field("schema", &self.schema)
            .field("dimension", &self.dimension)
            .field("count", &self.count)
            .field("metric", &self.metric)
            .field("normalize", &self.normalize)
            .field("truth", &(self.truth_rows, self.truth_depth))
            .finish()
    }
}
