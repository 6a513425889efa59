//! Dvel network simulator.
//!
//! Runs deterministic scenarios over the simulation harness, reports
//! per-tick preferred-tip agreement, and optionally dumps a checkable
//! trace document and a sled run artifact.
//!
//! Usage:
//!   simulator baseline
//!   simulator sybil --nodes 11 --start 10 --end 50
//!   simulator eclipse --victim 2 --hold 20
//!   simulator check --file trace.json

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use dvel::config::DvelConfig;
use dvel::sim::scenario::Scenario;
use dvel::sim::schedule::FixedDelay;
use dvel::sim::Simulation;
use dvel::storage::{RunMeta, SledStorage, Storage};
use dvel::trace::{check_trace, TraceDoc, TraceHeader};

/// Dvel deterministic ledger simulator.
#[derive(Parser, Debug)]
#[command(name = "simulator", version, about = "Dvel deterministic ledger simulator")]
struct Cli {
    /// Print every tick snapshot instead of only the summary.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Extra ticks after the last planned emission for deliveries to settle.
    #[arg(long, default_value_t = 10)]
    slack: u64,

    /// Write node 0's trace as a checkable JSON document.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Persist node 0's ledger and the run snapshot to a sled database.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Honest 3-node baseline: one chain, full agreement.
    Baseline {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Sybil swarm: node 0 honest, the rest emitting round-robin.
    Sybil {
        /// Total node count (node 0 is the honest one).
        #[arg(long, default_value_t = 11)]
        nodes: u32,
        /// First swarm tick.
        #[arg(long, default_value_t = 10)]
        start: u64,
        /// Last swarm tick.
        #[arg(long, default_value_t = 40)]
        end: u64,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Eclipse: messages to the victim are withheld for a window, then
    /// released; the victim must converge back onto the honest tip.
    Eclipse {
        /// Victim node id.
        #[arg(long, default_value_t = 2)]
        victim: u32,
        /// Ticks every delivery to the victim is withheld.
        #[arg(long, default_value_t = 20)]
        hold: u64,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Replay and verify a trace document.
    Check {
        /// Path to a trace JSON file.
        #[arg(long)]
        file: PathBuf,
    },
}

/// Result of one post-run expectation.
struct CheckResult {
    name: &'static str,
    passed: bool,
    detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        CheckResult {
            name,
            passed: true,
            detail: detail.into(),
        }
    }
    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        CheckResult {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let exit = match cli.command {
        Command::Baseline { run } => run_scenario(Scenario::honest_3nodes(), &run, cli.verbose),
        Command::Sybil {
            nodes,
            start,
            end,
            run,
        } => run_scenario(Scenario::sybil_swarm(nodes, start, end), &run, cli.verbose),
        Command::Eclipse { victim, hold, run } => {
            run_eclipse(victim, hold, &run, cli.verbose)
        }
        Command::Check { file } => check_file(&file),
    };
    std::process::exit(exit);
}

fn run_scenario(scenario: Scenario, args: &RunArgs, verbose: bool) -> i32 {
    let config = DvelConfig::for_simulation();
    let horizon = scenario.horizon(args.slack);
    let sim = Simulation::from_scenario(scenario, config.clone());
    execute(sim, horizon, args, verbose, &config)
}

/// The eclipse run holds every delivery to the victim for `hold` ticks on
/// top of the schedule, then lets the backlog through.
fn run_eclipse(victim: u32, hold: u64, args: &RunArgs, verbose: bool) -> i32 {
    let config = DvelConfig::for_simulation();
    let scenario = Scenario::honest_3nodes();
    let horizon = scenario.horizon(args.slack + hold);
    let mut sim = Simulation::from_scenario(scenario, config.clone());
    sim.set_delivery_policy(Box::new(FixedDelay {
        victim,
        extra: hold,
    }));
    execute(sim, horizon, args, verbose, &config)
}

fn execute(
    mut sim: Simulation,
    horizon: u64,
    args: &RunArgs,
    verbose: bool,
    config: &DvelConfig,
) -> i32 {
    let name = sim.scenario().name;
    println!("{}", format!("=== dvel simulator: {} ===", name).bright_cyan().bold());

    let snapshots = sim.run(horizon);

    if verbose {
        for snap in &snapshots {
            println!(
                "tick={} unique_preferred_tips={}",
                snap.tick, snap.unique_preferred_tips
            );
        }
    }

    // Per-node summary.
    println!("{}", "--- summary ---".yellow());
    for node in sim.nodes() {
        let m = sim.metrics().node(node.id());
        println!(
            "  node[{}] local={} remote_ok={} rejected={} pending_add={} drained={} dropped={} ledger={}",
            node.id(),
            m.local_appended,
            m.remote_accepted,
            m.rejected,
            m.pending_added,
            m.pending_drained,
            m.pending_dropped,
            node.ledger().len(),
        );
    }

    let results = evaluate(&sim, &snapshots);
    let mut ok = true;
    for r in &results {
        let status = if r.passed {
            "PASS".green().bold()
        } else {
            ok = false;
            "FAIL".red().bold()
        };
        println!("  [{}] {} - {}", status, r.name, r.detail);
    }

    if let Err(e) = write_artifacts(&sim, &snapshots, args, config) {
        println!("  [{}] artifacts - {}", "FAIL".red().bold(), e);
        ok = false;
    }

    if ok {
        println!("{}", "all checks passed".green().bold());
        0
    } else {
        println!("{}", "some checks failed".red().bold());
        1
    }
}

/// Post-run expectations shared by every scenario.
fn evaluate(sim: &Simulation, snapshots: &[dvel::sim::metrics::TickSnapshot]) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let last = snapshots.last().expect("at least one tick ran");

    if sim.bus_pending() == 0 {
        results.push(CheckResult::pass("bus drained", "no scheduled messages left"));
    } else {
        results.push(CheckResult::fail(
            "bus drained",
            format!("{} messages still scheduled", sim.bus_pending()),
        ));
    }

    let stuck: Vec<u32> = sim
        .nodes()
        .iter()
        .filter(|n| n.pending_len() > 0)
        .map(|n| n.id())
        .collect();
    if stuck.is_empty() {
        results.push(CheckResult::pass("pools empty", "no event awaits a parent"));
    } else {
        results.push(CheckResult::fail(
            "pools empty",
            format!("nodes with parked events: {:?}", stuck),
        ));
    }

    // Eclipse victims rejoin agreement once traffic heals; a plain run
    // should simply agree.
    if last.unique_preferred_tips == 1 {
        results.push(CheckResult::pass("agreement", "one preferred tip across nodes"));
    } else {
        results.push(CheckResult::fail(
            "agreement",
            format!("{} distinct preferred tips", last.unique_preferred_tips),
        ));
    }

    // Under a sybil swarm the honest node must still prefer a tip authored
    // by an honest identity.
    if !sim.scenario().sybil_nodes.is_empty() {
        let sybil_authors: Vec<_> = sim
            .scenario()
            .sybil_nodes
            .iter()
            .map(|&id| sim.node(id).author())
            .collect();
        let honest = sim.node(0);
        match honest
            .preferred_tip(last.tick)
            .and_then(|p| honest.ledger().get(&p.tip).cloned())
        {
            Some(tip_event) if !sybil_authors.contains(&tip_event.author) => {
                results.push(CheckResult::pass(
                    "sybil suppression",
                    "honest node prefers an honest-authored tip",
                ));
            }
            Some(_) => {
                results.push(CheckResult::fail(
                    "sybil suppression",
                    "honest node prefers a sybil-authored tip",
                ));
            }
            None => {
                results.push(CheckResult::fail("sybil suppression", "no preferred tip"));
            }
        }
    }

    results
}

fn write_artifacts(
    sim: &Simulation,
    snapshots: &[dvel::sim::metrics::TickSnapshot],
    args: &RunArgs,
    config: &DvelConfig,
) -> Result<(), String> {
    let last = snapshots.last().expect("at least one tick ran");
    let observer = sim.node(0);

    if let Some(path) = &args.trace_out {
        let header = TraceHeader {
            protocol_version: dvel::constants::PROTOCOL_VERSION,
            max_backward_skew: config.validation.max_backward_skew,
            max_pending_total: config.node.max_pending_total as u64,
            max_drain_steps: config.node.max_drain_steps as u64,
            sybil_config: config.sybil.clone(),
            final_merkle_root: observer.ledger().merkle_root().map(hex::encode),
            sources: vec![format!("node-{}", observer.id())],
        };
        let doc = TraceDoc::from_recorder(header, observer.trace());
        let json = doc.to_json().map_err(|e| e.to_string())?;
        std::fs::write(path, json).map_err(|e| e.to_string())?;
        println!("  trace written to {}", path.display());
    }

    if let Some(path) = &args.store {
        let store = SledStorage::open(path).map_err(|e| e.to_string())?;
        store.put_ledger(observer.ledger()).map_err(|e| e.to_string())?;
        store
            .put_meta(&RunMeta {
                final_tick: last.tick,
                event_count: observer.ledger().len() as u64,
                merkle_root: observer.ledger().merkle_root(),
                preferred_tip: observer.preferred_tip(last.tick).map(|p| p.tip.0),
                unique_preferred_tips: last.unique_preferred_tips,
            })
            .map_err(|e| e.to_string())?;
        store.flush().map_err(|e| e.to_string())?;
        println!("  run artifact written to {}", path.display());
    }

    Ok(())
}

fn check_file(path: &PathBuf) -> i32 {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            println!("{} cannot read {}: {}", "FAIL".red().bold(), path.display(), e);
            return 1;
        }
    };
    let doc = match TraceDoc::from_json(&json) {
        Ok(doc) => doc,
        Err(e) => {
            println!("{} {}", "FAIL".red().bold(), e);
            return 1;
        }
    };
    match check_trace(&doc) {
        Ok(()) => {
            println!(
                "{} {} rows verified",
                "OK".green().bold(),
                doc.rows.len()
            );
            0
        }
        Err(e) => {
            println!("{} {}", "FAIL".red().bold(), e);
            1
        }
    }
}
