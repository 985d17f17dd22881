//! Panotrail session simulator CLI
//!
//! Run deterministic navigation scenarios against a synthetic or loaded survey.

use clap::Parser;
use panotrail_core::{load_csv_path, DatasetConfig, ImageryVariant};
use panotrail_sim::scenarios::ScenarioId;
use panotrail_sim::{ScenarioResult, ScenarioRunner, SimConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Panotrail Deterministic Session Testing CLI
#[derive(Parser, Debug)]
#[command(name = "panotrail-sim")]
#[command(about = "Run deterministic navigation scenarios for Panotrail", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (boundary_walk, toggle_involution, engine_drift, stale_fetch, random_walk, provider_contract, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Survey CSV to browse instead of a synthetic track
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Read the dataset as the flat-image variant (front/rear file columns)
    #[arg(long)]
    flat: bool,

    /// Number of points in the synthetic track
    #[arg(short, long, default_value = "50")]
    points: usize,

    /// Events per random walk
    #[arg(long, default_value = "200")]
    steps: usize,

    /// Probability of a simulated transport failure per fetch
    #[arg(long, default_value = "0.1")]
    failure_rate: f64,

    /// Number of random seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the session trace of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    if !args.json {
        info!("Panotrail session simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    // A loaded dataset is shared by every seed
    let dataset = match &args.dataset {
        Some(path) => {
            let config = DatasetConfig {
                variant: if args.flat {
                    ImageryVariant::Flat
                } else {
                    ImageryVariant::Graph
                },
                ..DatasetConfig::default()
            };
            match load_csv_path(path, &config) {
                Ok(dataset) => {
                    info!(
                        "Loaded {} points from {} ({} rows dropped)",
                        dataset.len(),
                        path.display(),
                        dataset.dropped()
                    );
                    Some(Arc::new(dataset))
                }
                Err(e) => {
                    error!("Failed to load {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        None => None,
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| -> ScenarioRunner {
        let config = SimConfig {
            seed,
            points: args.points,
            steps: args.steps,
            fetch_failure_rate: args.failure_rate,
            flat: args.flat,
            ..SimConfig::default()
        };
        match &dataset {
            Some(dataset) => ScenarioRunner::with_dataset(config, dataset.clone()),
            None => ScenarioRunner::new(config).unwrap_or_else(|e| {
                error!("Cannot build a {}-point track: {}", args.points, e);
                std::process::exit(1);
            }),
        }
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        info!("Running with export to: {}", export_path);
        let scenario = scenarios[0];
        let (result, export) = runner_for(base_seed).run_with_export(scenario).await;

        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
            std::process::exit(1);
        } else {
            info!("Exported {} frames to {}", export.frames.len(), export_path);
        }

        if result.passed {
            info!("✓ {} (seed={}) PASSED - exported to {}", scenario.name(), base_seed, export_path);
        } else {
            error!(
                "✗ {} FAILED: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "events": r.events,
                    "checks": r.checks,
                    "time_ms": r.final_time_ms,
                    "refreshes": r.metrics.refreshes,
                    "stale_loads": r.metrics.loads_stale,
                    "failed_loads": r.metrics.loads_failed,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
