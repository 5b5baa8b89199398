//! Reproducible latency and recall benchmarking for pluggable ANN engines.
//!
//! The crate is organized leaf-first:
//!
//! - [`metric`]: the closed set of distance metrics and their text aliases.
//! - [`index`]: the capability contract engines implement
//!   ([`IndexUnderTest`], [`IndexFactory`]); [`engines`] ships a flat
//!   baseline and, with the `usearch` feature, an HNSW engine.
//! - [`groundtruth`]: exact top-k through an ordered chain of backends.
//! - [`dataset`]: cache-backed corpora, fingerprinted synthetic generation,
//!   lazily memoized accessors. [`store`] is the file format underneath.
//! - [`runner`]: the stage-timed iteration loop, reporting through
//!   [`observer`] hooks.
//!
//! # Example
//!
//! ```no_run
//! use annb::{EngineFactory, Fingerprint, IndexFactory, MetricType, RandomDataset, Runner, RunnerConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dataset = RandomDataset::open_or_generate(
//!     "random_4_2000_ip.annb",
//!     Fingerprint::new(4, 2000, MetricType::InnerProduct, true),
//!     42,
//! )?;
//! let mut factory = EngineFactory::new();
//! factory.setup()?;
//!
//! let config = RunnerConfig::default()
//!     .with_dimension(4)
//!     .with_metric(MetricType::InnerProduct)
//!     .with_iterations(5);
//! let report = Runner::new(&dataset, &factory, config)?.run()?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod engines;
pub mod error;
pub mod groundtruth;
pub mod index;
pub mod knn;
pub mod matrix;
pub mod metric;
pub mod metrics;
pub mod observer;
pub mod runner;
pub mod store;

pub use config::{BenchConfig, EngineConfig, RunnerConfig, SearchArgs, TestMode};
pub use dataset::{CachedDataset, CreateOptions, Dataset, Fingerprint, RandomDataset};
pub use engines::{EngineFactory, FlatIndex};
pub use error::{Error, Result};
pub use groundtruth::{generate_groundtruth, ExactKnnBackend, GroundTruthGenerator};
pub use index::{IndexFactory, IndexUnderTest};
pub use knn::Neighbors;
pub use matrix::Matrix;
pub use metric::MetricType;
pub use observer::{StageEvent, StageObserver, StageRecorder, StageSummary, TracingObserver};
pub use runner::{RunMode, RunReport, Runner, RunnerState};
