//! Shared fixtures for integration tests: seeded data and an instrumented
//! engine that records every lifecycle call.
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use annb::{
    EngineConfig, Fingerprint, IndexFactory, IndexUnderTest, Matrix, MetricType, Neighbors,
    RandomDataset, SearchArgs,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Uniform `[0, 1)` matrix from a fixed seed.
pub fn random_matrix(rows: usize, cols: usize, seed: u64) -> Matrix<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.gen()).collect();
    Matrix::from_vec(data, rows, cols).unwrap()
}

/// Small L2 corpus cached under `dir`.
pub fn small_dataset(dir: &Path, dimension: usize, count: usize, metric: MetricType) -> RandomDataset {
    annb_core::telemetry::init_test_subscriber();
    RandomDataset::open_or_generate(
        dir.join(format!("random_{}_{}_{}.annb", dimension, count, metric)),
        Fingerprint::new(dimension, count, metric, false),
        42,
    )
    .unwrap()
}

/// Ordered log of lifecycle calls, e.g. `create#1`, `train#1`, `cleanup#1`.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Factory producing [`MockIndex`] instances that share one [`CallLog`].
#[derive(Clone, Default)]
pub struct MockFactory {
    pub log: CallLog,
    pub search_delay: Duration,
    pub train_delay: Duration,
    /// Lifecycle call that returns an error.
    pub fail_on: Option<&'static str>,
    pub verify_result: bool,
    created: Arc<Mutex<usize>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            verify_result: true,
            ..Default::default()
        }
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    pub fn with_train_delay(mut self, delay: Duration) -> Self {
        self.train_delay = delay;
        self
    }

    pub fn with_fail_on(mut self, stage: &'static str) -> Self {
        self.fail_on = Some(stage);
        self
    }

    pub fn with_verify_result(mut self, ok: bool) -> Self {
        self.verify_result = ok;
        self
    }

    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

impl IndexFactory for MockFactory {
    fn setup(&mut self) -> anyhow::Result<()> {
        self.log.push("setup".to_string());
        Ok(())
    }

    fn create(
        &self,
        name: &str,
        dimension: usize,
        metric: MetricType,
        _config: &EngineConfig,
    ) -> anyhow::Result<Box<dyn IndexUnderTest>> {
        let id = {
            let mut created = self.created.lock().unwrap();
            *created += 1;
            *created
        };
        self.log.push(format!("create#{}", id));
        Ok(Box::new(MockIndex {
            id,
            name: name.to_string(),
            dimension,
            metric,
            factory: self.clone(),
        }))
    }
}

pub struct MockIndex {
    id: usize,
    name: String,
    dimension: usize,
    metric: MetricType,
    factory: MockFactory,
}

impl MockIndex {
    fn call(&self, stage: &str) -> anyhow::Result<()> {
        self.factory.log.push(format!("{}#{}", stage, self.id));
        if self.factory.fail_on == Some(stage) {
            anyhow::bail!("injected {} failure", stage);
        }
        Ok(())
    }
}

impl IndexUnderTest for MockIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> MetricType {
        self.metric
    }

    fn verify(&self) -> anyhow::Result<bool> {
        self.call("verify")?;
        Ok(self.factory.verify_result)
    }

    fn train(&mut self, _data: &Matrix<f32>) -> anyhow::Result<()> {
        std::thread::sleep(self.factory.train_delay);
        self.call("train")
    }

    fn add(&mut self, _data: &Matrix<f32>) -> anyhow::Result<()> {
        self.call("add")
    }

    fn search(&self, query: &Matrix<f32>, k: usize) -> anyhow::Result<Neighbors> {
        std::thread::sleep(self.factory.search_delay);
        self.call("search")?;
        Ok(Neighbors {
            distances: Matrix::filled(query.rows(), k, 0.0),
            ids: Matrix::filled(query.rows(), k, 0),
        })
    }

    fn warmup(&mut self) -> anyhow::Result<()> {
        self.call("warmup")
    }

    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.call("cleanup")
    }

    fn update_search_args(&mut self, args: &SearchArgs) -> anyhow::Result<()> {
        self.call(&format!("search_args({:?})", args.nprobe))
    }
}
