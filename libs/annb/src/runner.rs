//! Stage-timed benchmark loop.
//!
//! A [`Runner`] validates its configuration against the dataset, then drives
//! one of two protocols until the stop condition holds:
//!
//! - **search mode**: build one index (train + add + warmup), then time one
//!   `search(query[..nq], topk)` per iteration;
//! - **train mode**: per iteration, clean up the previous index, create a
//!   fresh one, time `train` and add the corpus.
//!
//! The stop condition is checked after each completed iteration: stop once
//! `iterations` have run or, with a non-negative timeout, once the time since
//! `run()` was entered exceeds it. A slow iteration is never interrupted.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::index::{IndexFactory, IndexUnderTest};
use crate::matrix::Matrix;
use crate::metrics::{compute_recall, LatencyStats};
use crate::observer::{StageEvent, StageObserver, StageSummary, TracingObserver};

/// Which protocol a running runner follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Search,
    Train,
}

/// Lifecycle of a runner. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Initializing,
    Running(RunMode),
    Stopped,
}

/// Outcome of [`Runner::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Completed iterations.
    pub iterations: usize,
    /// Time from `run()` entry to stop.
    pub elapsed: Duration,
    /// Per-key averages, in first-seen order.
    pub stages: Vec<StageSummary>,
    /// Mean Recall@topk over all searches, when requested.
    pub recall: Option<f64>,
}

impl RunReport {
    pub fn stage(&self, key: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.key == key)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} iterations in {:.3}s",
            self.iterations,
            self.elapsed.as_secs_f64()
        )?;
        for s in &self.stages {
            writeln!(f, "  {}: {}", s.key, s.stats.summary())?;
        }
        if let Some(recall) = self.recall {
            writeln!(f, "  recall: {:.4}", recall)?;
        }
        Ok(())
    }
}

/// Per-run bookkeeping: iteration counter, start time, durations by key.
struct BenchmarkRun {
    started: Instant,
    count: usize,
    durations: Vec<(String, Vec<Duration>)>,
    recalls: Vec<f64>,
}

impl BenchmarkRun {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            count: 0,
            durations: Vec::new(),
            recalls: Vec::new(),
        }
    }

    fn record(&mut self, key: &str, duration: Duration) {
        match self.durations.iter_mut().find(|(k, _)| k == key) {
            Some((_, list)) => list.push(duration),
            None => self.durations.push((key.to_string(), vec![duration])),
        }
    }

    fn summaries(&self) -> Vec<StageSummary> {
        self.durations
            .iter()
            .map(|(key, list)| StageSummary {
                key: key.clone(),
                mean: list.iter().sum::<Duration>() / list.len() as u32,
                count: list.len(),
                stats: LatencyStats::from_durations(list),
            })
            .collect()
    }
}

/// Aggregation key of a stage name: everything before the first `#`.
pub fn stage_key(stage: &str) -> &str {
    stage.split('#').next().unwrap_or(stage)
}

fn engine_error(stage: &str, err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(Error::UnsupportedEngine(tag)) => Error::UnsupportedEngine(tag),
        Ok(other) => Error::engine(stage, other.into()),
        Err(err) => Error::engine(stage, err),
    }
}

/// Drives one dataset and one factory through a timed loop.
pub struct Runner<'a> {
    dataset: &'a dyn Dataset,
    factory: &'a dyn IndexFactory,
    config: RunnerConfig,
    observer: Box<dyn StageObserver + 'a>,
    state: RunnerState,
}

impl<'a> Runner<'a> {
    /// Build a runner. Fails before any index exists when the configuration
    /// is unusable or disagrees with the dataset.
    pub fn new(
        dataset: &'a dyn Dataset,
        factory: &'a dyn IndexFactory,
        config: RunnerConfig,
    ) -> Result<Self> {
        let runner = Self {
            dataset,
            factory,
            config,
            observer: Box::new(TracingObserver),
            state: RunnerState::Initializing,
        };
        runner.validate()?;
        Ok(runner)
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: impl StageObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn validate(&self) -> Result<()> {
        let config = &self.config;
        config.check()?;

        if config.dimension != self.dataset.dimension() {
            return Err(Error::ConfigMismatch {
                field: "dimension",
                runner: config.dimension.to_string(),
                dataset: self.dataset.dimension().to_string(),
            });
        }
        if config.metric != self.dataset.metric() {
            return Err(Error::ConfigMismatch {
                field: "metric",
                runner: config.metric.to_string(),
                dataset: self.dataset.metric().to_string(),
            });
        }
        if config.measures_recall() {
            if config.topk > self.dataset.truth_depth() {
                return Err(Error::InvalidConfig(format!(
                    "topk {} exceeds ground-truth depth {}",
                    config.topk,
                    self.dataset.truth_depth()
                )));
            }
            if config.nq > self.dataset.truth_rows() {
                return Err(Error::InvalidConfig(format!(
                    "nq {} exceeds the {} queries with ground truth",
                    config.nq,
                    self.dataset.truth_rows()
                )));
            }
        }
        Ok(())
    }

    /// Stage name of the search call in `iteration`.
    pub fn search_stage(&self, iteration: usize) -> String {
        format!(
            "search({}),nb={},dim={},query={},k={}#{}",
            self.config.metric.label(),
            self.dataset.count(),
            self.dataset.dimension(),
            self.config.nq,
            self.config.topk,
            iteration
        )
    }

    /// Execute the configured protocol until the stop condition holds.
    ///
    /// A runner runs once; a second call fails with `InvalidConfig`.
    pub fn run(&mut self) -> Result<RunReport> {
        if self.state != RunnerState::Initializing {
            return Err(Error::InvalidConfig(format!(
                "runner `{}` already ran",
                self.config.name
            )));
        }
        let mut run = BenchmarkRun::start();
        let mode = if self.config.trains() {
            RunMode::Train
        } else {
            RunMode::Search
        };
        self.state = RunnerState::Running(mode);
        info!(
            name = %self.config.name,
            dataset = self.dataset.name(),
            ?mode,
            iterations = self.config.iterations,
            timeout = self.config.timeout,
            "Starting run"
        );

        let result = match mode {
            RunMode::Search => self.run_search(&mut run),
            RunMode::Train => self.run_train(&mut run),
        };
        self.state = RunnerState::Stopped;
        result?;

        let stages = run.summaries();
        self.observer.on_summary(&stages);
        let recall = if run.recalls.is_empty() {
            None
        } else {
            Some(run.recalls.iter().sum::<f64>() / run.recalls.len() as f64)
        };
        let report = RunReport {
            iterations: run.count,
            elapsed: run.started.elapsed(),
            stages,
            recall,
        };
        debug!(iterations = report.iterations, "Run stopped");
        Ok(report)
    }

    fn should_stop(&self, run: &BenchmarkRun) -> bool {
        if run.count >= self.config.iterations {
            return true;
        }
        match self.config.timeout() {
            Some(limit) => run.started.elapsed() > limit,
            None => false,
        }
    }

    fn create_index(&self) -> Result<Box<dyn IndexUnderTest>> {
        self.factory
            .create(
                &self.config.name,
                self.config.dimension,
                self.config.metric,
                &self.config.engine,
            )
            .map_err(|e| engine_error("create", e))
    }

    fn verify(&self, index: &dyn IndexUnderTest) -> Result<()> {
        let ok = index.verify().map_err(|e| engine_error("verify", e))?;
        if !ok {
            return Err(Error::engine(
                "verify",
                anyhow::anyhow!("index `{}` failed its self-check", index.name()),
            ));
        }
        Ok(())
    }

    fn observe(&mut self, run: &mut BenchmarkRun, stage: String, duration: Duration) {
        let key = stage_key(&stage).to_string();
        run.record(&key, duration);
        self.observer.on_stage(&StageEvent {
            stage,
            key,
            iteration: run.count,
            duration,
        });
    }

    fn run_search(&mut self, run: &mut BenchmarkRun) -> Result<()> {
        let dataset = self.dataset;
        let data = dataset.data()?;
        let mut index = self.create_index()?;
        if self.config.verify {
            self.verify(index.as_ref())?;
        }
        index.train(data).map_err(|e| engine_error("train", e))?;
        index.add(data).map_err(|e| engine_error("add", e))?;
        if !self.config.search_args.is_empty() {
            index
                .update_search_args(&self.config.search_args)
                .map_err(|e| engine_error("update_search_args", e))?;
        }
        index.warmup().map_err(|e| engine_error("warmup", e))?;

        let query = dataset.query_data()?.head(self.config.nq);
        let truth: Option<Matrix<i64>> = if self.config.measures_recall() {
            Some(dataset.ground_truth()?.head(self.config.nq))
        } else {
            None
        };

        loop {
            run.count += 1;
            let stage = self.search_stage(run.count);
            let start = Instant::now();
            let found = index.search(&query, self.config.topk);
            let duration = start.elapsed();
            let found = found.map_err(|e| engine_error(&stage, e))?;
            self.observe(run, stage, duration);

            if let Some(truth) = &truth {
                run.recalls
                    .push(compute_recall(&found.ids, truth, self.config.topk));
            }
            if self.should_stop(run) {
                break;
            }
        }

        index.cleanup().map_err(|e| engine_error("cleanup", e))
    }

    fn run_train(&mut self, run: &mut BenchmarkRun) -> Result<()> {
        let dataset = self.dataset;
        let data = dataset.data()?;
        let mut current: Option<Box<dyn IndexUnderTest>> = None;

        loop {
            run.count += 1;
            if let Some(mut previous) = current.take() {
                previous.cleanup().map_err(|e| engine_error("cleanup", e))?;
            }
            let mut index = self.create_index()?;
            if self.config.verify && run.count == 1 {
                self.verify(index.as_ref())?;
            }

            let start = Instant::now();
            let trained = index.train(data);
            let duration = start.elapsed();
            trained.map_err(|e| engine_error("train", e))?;
            self.observe(run, "train".to_string(), duration);

            index.add(data).map_err(|e| engine_error("add", e))?;
            current = Some(index);

            if self.should_stop(run) {
                break;
            }
        }

        match current.as_mut() {
            Some(index) => index.cleanup().map_err(|e| engine_error("cleanup", e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_key() {
        assert_eq!(stage_key("search(L2),nb=10,dim=4,query=1,k=1#3"), "search(L2),nb=10,dim=4,query=1,k=1");
        assert_eq!(stage_key("train"), "train");
        assert_eq!(stage_key("a#b#c"), "a");
    }

    #[test]
    fn test_engine_error_wrapping() {
        let err = engine_error("train", anyhow::anyhow!("out of memory"));
        match err {
            Error::Engine { stage, source } => {
                assert_eq!(stage, "train");
                assert_eq!(source.to_string(), "out of memory");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = engine_error("create", Error::UnsupportedEngine("ivf".into()).into());
        assert!(matches!(err, Error::UnsupportedEngine(tag) if tag == "ivf"));
    }

    #[test]
    fn test_benchmark_run_means() {
        let mut run = BenchmarkRun::start();
        run.record("a", Duration::from_millis(2));
        run.record("b", Duration::from_millis(5));
        run.record("a", Duration::from_millis(4));
        let s = run.summaries();
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].key, "a");
        assert_eq!(s[0].mean, Duration::from_millis(3));
        assert_eq!(s[0].count, 2);
        assert_eq!(s[1].mean, Duration::from_millis(5));
    }
}
