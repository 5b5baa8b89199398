//! CLI command implementations.
//!
//! - Run: sweep corpus size x metric x nq x topk over random datasets
//! - Generate: create or reuse one fingerprinted random dataset
//! - Inspect: dump a dataset file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use annb::dataset::Schema;
use annb::store::StoreFile;
use annb::{
    BenchConfig, CachedDataset, Dataset, EngineFactory, Fingerprint, IndexFactory, MetricType,
    RandomDataset, RunReport, Runner,
};

fn parse_metric(text: &str) -> std::result::Result<MetricType, String> {
    MetricType::from_text(text).map_err(|e| e.to_string())
}

/// Cache file name for one sweep point.
fn cache_file_name(dimension: usize, count: usize, metric: MetricType) -> String {
    format!("random_dataset_{}_{}_{}.annb", dimension, count, metric)
}

// ============================================================================
// Run Command
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Benchmark config file (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Directory for generated dataset caches
    #[arg(long, default_value = "./cache")]
    pub cache_dir: PathBuf,

    /// Keep generated caches instead of deleting them after each corpus
    #[arg(long, default_value = "false")]
    pub keep_cache: bool,

    /// Also write the results table as JSON
    #[arg(long)]
    pub results: Option<PathBuf>,
}

struct SweepRow {
    count: usize,
    metric: MetricType,
    nq: usize,
    topk: usize,
    report: RunReport,
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = BenchConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let sweep = &config.sweep;

    println!("=== annb sweep ===");
    println!("Engine: {}", config.runner.engine.index);
    println!("Dimension: {}, normalize: {}", config.dataset.dimension, config.dataset.normalize);
    println!(
        "Counts: {:?}, metrics: {:?}, nq: {:?}, topk: {:?}",
        sweep.counts,
        sweep.metrics.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        sweep.nq,
        sweep.topk
    );

    let mut factory = EngineFactory::new();
    factory.setup().context("Engine factory setup failed")?;
    fs::create_dir_all(&args.cache_dir)
        .with_context(|| format!("Failed to create {}", args.cache_dir.display()))?;

    let mut rows = Vec::new();
    for &count in &sweep.counts {
        for &metric in &sweep.metrics {
            let path = args
                .cache_dir
                .join(cache_file_name(config.dataset.dimension, count, metric));
            let fingerprint = Fingerprint::new(
                config.dataset.dimension,
                count,
                metric,
                config.dataset.normalize,
            );
            let dataset = RandomDataset::open_or_generate(&path, fingerprint, config.dataset.seed)
                .with_context(|| format!("Failed to prepare dataset {}", path.display()))?;

            for &nq in &sweep.nq {
                for &topk in &sweep.topk {
                    let runner_config = config.runner_for(metric, nq, topk);
                    let report = Runner::new(&dataset, &factory, runner_config)?
                        .run()
                        .with_context(|| {
                            format!("Run failed (nb={}, metric={}, nq={}, k={})", count, metric, nq, topk)
                        })?;
                    rows.push(SweepRow {
                        count,
                        metric,
                        nq,
                        topk,
                        report,
                    });
                }
            }

            drop(dataset);
            if !args.keep_cache {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                info!(path = %path.display(), "Removed dataset cache");
            }
        }
    }

    print_table(&rows);
    if let Some(results) = &args.results {
        write_results(results, &rows)?;
        println!("Results written to {}", results.display());
    }
    Ok(())
}

fn print_table(rows: &[SweepRow]) {
    println!();
    println!(
        "{:>10} {:>14} {:>6} {:>6} {:>6} {:>12} {:>12} {:>8}",
        "nb", "metric", "nq", "k", "iters", "mean_ms", "p99_ms", "recall"
    );
    for row in rows {
        let (mean, p99) = row
            .report
            .stages
            .first()
            .map(|s| (s.stats.avg_ms, s.stats.p99_ms))
            .unwrap_or((0.0, 0.0));
        let recall = row
            .report
            .recall
            .map(|r| format!("{:.4}", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10} {:>14} {:>6} {:>6} {:>6} {:>12.3} {:>12.3} {:>8}",
            row.count,
            row.metric.as_str(),
            row.nq,
            row.topk,
            row.report.iterations,
            mean,
            p99,
            recall
        );
    }
}

fn write_results(path: &Path, rows: &[SweepRow]) -> Result<()> {
    let json: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "count": row.count,
                "metric": row.metric,
                "nq": row.nq,
                "topk": row.topk,
                "iterations": row.report.iterations,
                "elapsed_s": row.report.elapsed.as_secs_f64(),
                "recall": row.report.recall,
                "stages": row.report.stages.iter().map(|s| serde_json::json!({
                    "key": s.key,
                    "count": s.count,
                    "mean_ms": s.mean_ms(),
                    "p50_ms": s.stats.p50_ms,
                    "p99_ms": s.stats.p99_ms,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    let text = serde_json::to_string_pretty(&json)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// ============================================================================
// Generate Command
// ============================================================================

#[derive(Parser)]
pub struct GenerateArgs {
    /// Vector dimension
    #[arg(long, default_value = "128")]
    pub dimension: usize,

    /// Number of vectors
    #[arg(long, default_value = "10000")]
    pub count: usize,

    /// Metric: l2 | euclidean | ip | inner_product
    #[arg(long, default_value = "l2", value_parser = parse_metric)]
    pub metric: MetricType,

    /// L2-normalize generated vectors
    #[arg(long, default_value = "false")]
    pub normalize: bool,

    /// RNG seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Output file
    #[arg(long)]
    pub output: PathBuf,
}

pub fn generate(args: GenerateArgs) -> Result<()> {
    let fingerprint = Fingerprint::new(args.dimension, args.count, args.metric, args.normalize);
    let dataset = RandomDataset::open_or_generate(&args.output, fingerprint, args.seed)
        .with_context(|| format!("Failed to generate {}", args.output.display()))?;

    let action = if dataset.was_generated() {
        "Generated"
    } else {
        "Reused"
    };
    println!("{} {}", action, dataset.cached());
    println!(
        "Ground truth: {} queries x {} neighbors",
        dataset.truth_rows(),
        dataset.truth_depth()
    );
    Ok(())
}

// ============================================================================
// Inspect Command
// ============================================================================

#[derive(Parser)]
pub struct InspectArgs {
    /// Dataset file
    pub file: PathBuf,
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let store = StoreFile::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    println!("File: {}", args.file.display());
    println!("Attributes:");
    for (name, value) in store.attrs() {
        println!("  {} = {}", name, value);
    }
    println!("Arrays:");
    for (name, info) in store.arrays() {
        println!(
            "  {}: {:?} {}x{}",
            name, info.dtype, info.shape[0], info.shape[1]
        );
    }

    match CachedDataset::open(&args.file) {
        Ok(dataset) => {
            let schema = match dataset.schema() {
                Schema::Canonical => "canonical",
                Schema::Legacy => "legacy",
            };
            println!("Dataset: {} ({} schema)", dataset, schema);
            println!("Complete: {}", dataset.is_done());
            println!(
                "Ground truth: {} queries x {} neighbors",
                dataset.truth_rows(),
                dataset.truth_depth()
            );
        }
        Err(e) => println!("Dataset: not usable ({})", e),
    }
    Ok(())
}
