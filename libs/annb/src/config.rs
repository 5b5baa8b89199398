//! Runner, engine and sweep configuration.
//!
//! Everything here deserializes from JSON with defaults for omitted fields,
//! so a config file only needs to name what it changes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::metric::MetricType;

/// What a run measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// Repeated cold construction, timing `train`.
    Train,
    /// Steady-state search latency.
    Search,
    /// Search latency plus Recall@topk against ground truth.
    Recall,
}

impl TestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestMode::Train => "train",
            TestMode::Search => "search",
            TestMode::Recall => "recall",
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "train" => Ok(TestMode::Train),
            "search" => Ok(TestMode::Search),
            "recall" => Ok(TestMode::Recall),
            other => Err(Error::InvalidConfig(format!("unknown test mode `{}`", other))),
        }
    }
}

/// Parse a comma-separated mode list such as `"search,recall"`.
pub fn parse_test_modes(text: &str) -> Result<Vec<TestMode>> {
    let mut modes = Vec::new();
    for part in text.split(',').filter(|p| !p.trim().is_empty()) {
        let mode: TestMode = part.parse()?;
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    if modes.is_empty() {
        return Err(Error::InvalidConfig("no test modes given".to_string()));
    }
    Ok(modes)
}

// Accepts either "train,search" or ["train", "search"].
fn deserialize_test_modes<'de, D>(deserializer: D) -> std::result::Result<Vec<TestMode>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Modes {
        Text(String),
        List(Vec<TestMode>),
    }

    match Modes::deserialize(deserializer)? {
        Modes::Text(text) => parse_test_modes(&text).map_err(serde::de::Error::custom),
        Modes::List(list) => Ok(list),
    }
}

/// Run-time search parameters pushed to an index after construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchArgs {
    /// Search breadth (IVF probes, HNSW expansion).
    pub nprobe: Option<usize>,
}

impl SearchArgs {
    pub fn is_empty(&self) -> bool {
        self.nprobe.is_none()
    }
}

/// Engine selection and construction parameters.
///
/// `index` picks the engine variant:
/// - `flat`: exact brute force. Honors `accelerate`.
/// - `hnsw`: usearch HNSW (cargo feature `usearch`). Honors `connectivity`,
///   `expansion_add` and `nprobe` (as expansion_search).
///
/// Other keys, such as `nlist`, `m` or `nbits` for IVF/PQ engines plugged in
/// by other factories, land in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine variant tag.
    pub index: String,
    /// Use the accelerated code path where the engine has one.
    pub accelerate: bool,
    /// Initial search breadth.
    pub nprobe: Option<usize>,
    /// HNSW graph degree.
    pub connectivity: Option<usize>,
    /// HNSW construction breadth.
    pub expansion_add: Option<usize>,
    /// Engine-specific keys not covered above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index: "flat".to_string(),
            accelerate: false,
            nprobe: None,
            connectivity: None,
            expansion_add: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Runner configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Name handed to the factory for each index.
    pub name: String,
    /// Expected vector dimension; must match the dataset.
    pub dimension: usize,
    /// Expected metric; must match the dataset.
    pub metric: MetricType,
    /// Requested modes. `train` switches to the cold-construction protocol.
    #[serde(deserialize_with = "deserialize_test_modes")]
    pub test_modes: Vec<TestMode>,
    /// Queries per search call.
    pub nq: usize,
    /// Neighbors requested per query.
    pub topk: usize,
    /// Iteration limit.
    pub iterations: usize,
    /// Wall-clock limit in seconds, checked between iterations. Negative
    /// disables it.
    pub timeout: f64,
    /// Run the engine self-check before any timed stage.
    pub verify: bool,
    /// Applied through `update_search_args` before warmup.
    pub search_args: SearchArgs,
    /// Passed to the factory unchanged.
    pub engine: EngineConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "test".to_string(),
            dimension: 128,
            metric: MetricType::L2,
            test_modes: vec![TestMode::Search],
            nq: 10,
            topk: 10,
            iterations: 10,
            timeout: -1.0,
            verify: false,
            search_args: SearchArgs::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_metric(mut self, metric: MetricType) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_test_modes(mut self, modes: &[TestMode]) -> Self {
        self.test_modes = modes.to_vec();
        self
    }

    pub fn with_nq(mut self, nq: usize) -> Self {
        self.nq = nq;
        self
    }

    pub fn with_topk(mut self, topk: usize) -> Self {
        self.topk = topk;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_search_args(mut self, args: SearchArgs) -> Self {
        self.search_args = args;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Cold-construction protocol requested.
    pub fn trains(&self) -> bool {
        self.test_modes.contains(&TestMode::Train)
    }

    /// Recall scoring requested. Ignored in train mode.
    pub fn measures_recall(&self) -> bool {
        !self.trains() && self.test_modes.contains(&TestMode::Recall)
    }

    /// The timeout as a duration, `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.timeout).ok()
    }

    /// Checks that do not need a dataset.
    pub fn check(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::InvalidConfig("iterations must be positive".into()));
        }
        if self.nq == 0 {
            return Err(Error::InvalidConfig("nq must be positive".into()));
        }
        if self.topk == 0 {
            return Err(Error::InvalidConfig("topk must be positive".into()));
        }
        if self.test_modes.is_empty() {
            return Err(Error::InvalidConfig("no test modes given".into()));
        }
        if self.timeout.is_nan() {
            return Err(Error::InvalidConfig("timeout is not a number".into()));
        }
        Ok(())
    }
}

/// Synthetic corpus parameters shared by a sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Vector dimension.
    pub dimension: usize,
    /// L2-normalize generated rows.
    pub normalize: bool,
    /// RNG seed for generated rows.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dimension: 256,
            normalize: true,
            seed: 42,
        }
    }
}

/// Values swept by the CLI: every combination of the four lists is run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Corpus sizes.
    pub counts: Vec<usize>,
    /// Metrics.
    pub metrics: Vec<MetricType>,
    /// Queries per call.
    pub nq: Vec<usize>,
    /// Neighbors per query.
    pub topk: Vec<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            counts: vec![1_000_000, 2_000_000, 5_000_000],
            metrics: vec![MetricType::InnerProduct, MetricType::L2],
            nq: vec![1, 10, 100, 200],
            topk: vec![1, 10, 100],
        }
    }
}

/// Top-level benchmark file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub dataset: DatasetConfig,
    pub runner: RunnerConfig,
    pub sweep: SweepConfig,
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Runner config for one sweep point. Dimension comes from the dataset.
    pub fn runner_for(&self, metric: MetricType, nq: usize, topk: usize) -> RunnerConfig {
        self.runner
            .clone()
            .with_dimension(self.dataset.dimension)
            .with_metric(metric)
            .with_nq(nq)
            .with_topk(topk)
    }
}
