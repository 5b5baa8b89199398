//! ANN benchmark CLI.
//!
//! ## Commands
//!
//! ```bash
//! # Sweep corpus size x metric x nq x topk from a JSON config
//! annb run --config bench.json --cache-dir ./cache
//!
//! # Create (or reuse) a fingerprinted random dataset
//! annb generate --dimension 256 --count 100000 --metric ip --normalize --output random.annb
//!
//! # Show attributes and array shapes of a dataset file
//! annb inspect random.annb
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "annb")]
#[command(version, about = "Latency and recall benchmarks for ANN engines")]
struct Cli {
    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark sweep described by a config file
    Run(commands::RunArgs),

    /// Generate a random dataset with ground truth
    Generate(commands::GenerateArgs),

    /// Print a dataset file's attributes and arrays
    Inspect(commands::InspectArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "debug" } else { "info" };
    if let Err(e) = annb_core::telemetry::init_subscriber_with_default(directive) {
        eprintln!("tracing already initialized: {}", e);
    }

    match cli.command {
        Commands::Run(args) => commands::run(args),
        Commands::Generate(args) => commands::generate(args),
        Commands::Inspect(args) => commands::inspect(args),
    }
}
