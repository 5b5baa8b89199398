//! HNSW engine backed by usearch.

use anyhow::{bail, Context, Result};
use tracing::debug;
use usearch::{new_index, Index, IndexOptions, MetricKind, ScalarKind};

use super::{self_retrieval_check, warmup_searches};
use crate::config::{EngineConfig, SearchArgs};
use crate::index::IndexUnderTest;
use crate::knn::Neighbors;
use crate::matrix::Matrix;
use crate::metric::MetricType;

const DEFAULT_CONNECTIVITY: usize = 16;
const DEFAULT_EXPANSION_ADD: usize = 128;
const DEFAULT_EXPANSION_SEARCH: usize = 64;

pub struct UsearchIndex {
    name: String,
    dimension: usize,
    metric: MetricType,
    connectivity: usize,
    expansion_add: usize,
    expansion_search: usize,
    index: Index,
    next_key: u64,
}

impl UsearchIndex {
    pub fn new(name: &str, dimension: usize, metric: MetricType, config: &EngineConfig) -> Result<Self> {
        let connectivity = config.connectivity.unwrap_or(DEFAULT_CONNECTIVITY);
        let expansion_add = config.expansion_add.unwrap_or(DEFAULT_EXPANSION_ADD);
        let expansion_search = config.nprobe.unwrap_or(DEFAULT_EXPANSION_SEARCH);
        let options = index_options(dimension, metric, connectivity, expansion_add, expansion_search);
        Ok(Self {
            name: name.to_string(),
            dimension,
            metric,
            connectivity,
            expansion_add,
            expansion_search,
            index: new_index(&options).context("Failed to create usearch index")?,
            next_key: 0,
        })
    }
}

fn index_options(
    dimension: usize,
    metric: MetricType,
    connectivity: usize,
    expansion_add: usize,
    expansion_search: usize,
) -> IndexOptions {
    IndexOptions {
        dimensions: dimension,
        metric: match metric {
            MetricType::L2 => MetricKind::L2sq,
            MetricType::InnerProduct => MetricKind::IP,
        },
        quantization: ScalarKind::F32,
        connectivity,
        expansion_add,
        expansion_search,
        multi: false,
    }
}

impl IndexUnderTest for UsearchIndex {
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
        let mut scratch = UsearchIndex::new(
            &self.name,
            self.dimension,
            self.metric,
            &EngineConfig {
                connectivity: Some(self.connectivity),
                expansion_add: Some(self.expansion_add),
                nprobe: Some(self.expansion_search),
                ..Default::default()
            },
        )?;
        self_retrieval_check(&mut scratch)
    }

    fn train(&mut self, data: &Matrix<f32>) -> Result<()> {
        if data.cols() != self.dimension {
            bail!("train: expected {}-dimensional vectors, got {}", self.dimension, data.cols());
        }
        Ok(())
    }

    fn add(&mut self, data: &Matrix<f32>) -> Result<()> {
        if data.cols() != self.dimension {
            bail!("add: expected {}-dimensional vectors, got {}", self.dimension, data.cols());
        }
        self.index
            .reserve(self.index.size() + data.rows())
            .context("Failed to reserve capacity")?;
        for row in data.iter_rows() {
            self.index
                .add(self.next_key, row)
                .context("Failed to add vector")?;
            self.next_key += 1;
        }
        Ok(())
    }

    fn search(&self, query: &Matrix<f32>, k: usize) -> Result<Neighbors> {
        let mut distances = Matrix::filled(query.rows(), k, self.metric.worst());
        let mut ids = Matrix::filled(query.rows(), k, -1i64);
        for i in 0..query.rows() {
            let found = self.index.search(query.row(i), k).context("Search failed")?;
            for (slot, (key, dist)) in found.keys.iter().zip(&found.distances).enumerate() {
                ids.row_mut(i)[slot] = *key as i64;
                distances.row_mut(i)[slot] = match self.metric {
                    MetricType::L2 => *dist,
                    MetricType::InnerProduct => 1.0 - *dist,
                };
            }
        }
        Ok(Neighbors { distances, ids })
    }

    fn warmup(&mut self) -> Result<()> {
        warmup_searches(&*self)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.index.reset().context("Failed to reset index")?;
        self.next_key = 0;
        Ok(())
    }

    fn update_search_args(&mut self, args: &SearchArgs) -> Result<()> {
        if let Some(expansion) = args.nprobe {
            debug!(expansion, "Updating expansion_search");
            self.index.change_expansion_search(expansion);
            self.expansion_search = expansion;
        }
        Ok(())
    }
}
