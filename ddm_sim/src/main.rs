//! Domain-decomposition simulator CLI
//!
//! Runs seeded scenarios against the oracle, or serves as a TCP worker for a
//! coordinator started elsewhere.

use clap::{Parser, Subcommand};
use ddm_sim::scenarios::ScenarioId;
use ddm_sim::{run_tcp_worker, ScenarioResult, ScenarioRunner, SimConfig, Transport};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Domain-decomposition simulation CLI
#[derive(Parser, Debug)]
#[command(name = "ddm-sim")]
#[command(about = "Run seeded domain-decomposition scenarios against a direct solve", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Master seed for model generation (0 = random from time)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of subdomains
    #[arg(short = 'n', long)]
    subdomains: Option<usize>,

    /// Scenario to run (linear_chain, hardening_chain, truss_bridge,
    /// empty_interface, severed_worker, domain_edit, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Transport between coordinator and workers (memory, tcp)
    #[arg(short, long)]
    transport: Option<Transport>,

    /// Load steps per scenario
    #[arg(long)]
    steps: Option<usize>,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// JSON file with a full SimConfig; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one subdomain for a coordinator listening on TCP
    Worker {
        /// Coordinator address, e.g. 127.0.0.1:7400
        #[arg(long)]
        connect: String,

        /// Subdomain tag until the coordinator assigns one
        #[arg(long, default_value = "0")]
        tag: i32,
    },
}

fn load_config(args: &Args) -> Result<SimConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            SimConfig::from_json(&text).map_err(|e| e.to_string())?
        }
        None => SimConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(subdomains) = args.subdomains {
        config.num_subdomains = subdomains;
    }
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if config.seed == 0 {
        config.seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42);
    }
    Ok(config)
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if let Some(Command::Worker { connect, tag }) = &args.command {
        info!("Worker connecting to {}", connect);
        match run_tcp_worker(connect.as_str(), *tag) {
            Ok(exit) => {
                info!("Worker {} done after {} requests", exit.tag, exit.requests_served);
                return;
            }
            Err(e) => {
                error!("Worker failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let base_config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if !args.json {
        info!("DDM Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: linear_chain, hardening_chain, truss_bridge, empty_interface, severed_worker, domain_edit, all");
            std::process::exit(1);
        })]
    };

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let config = SimConfig {
            seed: base_config.seed.wrapping_add(seed_offset as u64),
            ..base_config.clone()
        };
        let runner = ScenarioRunner::new(config);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED  steps={} interface={} err={:.2e}",
                        scenario.name(),
                        result.seed,
                        result.steps_completed,
                        result.interface_size,
                        result.max_error
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        result.seed,
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
            "transport": base_config.transport.to_string(),
            "subdomains": base_config.num_subdomains,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.steps_completed,
                    "interface": r.interface_size,
                    "max_error": r.max_error,
                    "iterations": r.metrics.total_iterations,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
