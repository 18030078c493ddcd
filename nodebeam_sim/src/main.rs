//! Nodebeam Scenario CLI
//!
//! Runs deterministic physics and replication scenarios.

use clap::Parser;
use nodebeam_sim::scenarios::ScenarioId;
use nodebeam_sim::{ScenarioResult, ScenarioRunner, SimConfig};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Nodebeam deterministic scenario runner
#[derive(Parser, Debug)]
#[command(name = "nodebeam-sim")]
#[command(about = "Run deterministic soft-body physics scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scheduler worker threads
    #[arg(short, long, default_value = "2")]
    workers: usize,

    /// Scenario to run (node_pair_drop, beam_break, network_replay, ..., all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds (scenarios may run longer to settle)
    #[arg(short, long, default_value = "5")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export recorded frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Record every Nth frame when exporting
    #[arg(long, default_value = "5")]
    export_every: u64,

    /// Base configuration as (partial) JSON
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    if !args.json {
        info!("Nodebeam scenario runner v{}", env!("CARGO_PKG_VERSION"));
    }

    let base = match &args.config {
        Some(path) => match SimConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path, e);
                return 2;
            }
        },
        None => SimConfig::default(),
    };

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                error!("{}", e);
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                error!("Available scenarios: {}, all", names.join(", "));
                return 2;
            }
        }
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if let Some(path) = &args.export {
        if scenarios.len() > 1 {
            error!("--export only supports a single scenario, not 'all'");
            return 2;
        }
        let runner = ScenarioRunner::new(base_seed, args.workers)
            .with_config(base)
            .with_duration(args.duration)
            .with_export_every(args.export_every);
        let (result, export) = runner.run_recorded(scenarios[0]);
        if let Some(export) = export {
            match export.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path),
                Err(e) => error!("Failed to write export: {}", e),
            }
        }
        return report(&[result], args.json);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, args.workers)
            .with_config(base.clone())
            .with_duration(args.duration);

        for scenario in &scenarios {
            if scenario.uses_network() && !args.json {
                info!("{}: {}", scenario, scenario.description());
            }
            all_results.push(runner.run(*scenario));
        }
    }

    report(&all_results, args.json)
}

/// Prints the summary and returns the exit code.
fn report(results: &[ScenarioResult], json: bool) -> i32 {
    let total = results.len();
    let failed = results.iter().filter(|r| !r.passed).count();

    if json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode results: {}", e),
        }
    } else if failed == 0 {
        info!("All {} scenario runs passed", total);
    } else {
        error!("{}/{} scenario runs failed", failed, total);
        for result in results.iter().filter(|r| !r.passed) {
            error!(
                "  - {} seed={}: {}",
                result.scenario.name(),
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    if failed > 0 {
        1
    } else {
        0
    }
}
