//! Driftlab Divergence Simulator CLI
//!
//! Runs a complete divergence experiment in one process: a controller plus N
//! simulated clients funneling events into a durable shared counter.

use clap::Parser;
use driftlab_core::{
    AtomicStore, FileInstrumentation, Instrumentation, NullInstrumentation, SharedCounter,
    StoreCounter, StoreError, StoreTracker, TaskTracker,
};
use driftlab_env::{Cluster, DriftContext, NodeId, Orchestration, Platform, TokioContext};
use driftlab_sim::{
    ClientWorkload, Collaborators, ExperimentConfig, ExperimentController, NullPlatform, SimCluster,
    SimPlatform,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Driftlab Divergence Experiment CLI
#[derive(Parser, Debug)]
#[command(name = "driftlab-sim")]
#[command(about = "Run divergence experiments for Driftlab", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of client nodes
    #[arg(short, long, default_value = "3")]
    clients: usize,

    /// Events each client generates
    #[arg(short, long, default_value = "100")]
    max_events: u64,

    /// Probability an event is applied twice (models at-least-once delivery)
    #[arg(short, long, default_value = "0.0")]
    duplicates: f64,

    /// Mean think time between events in milliseconds (0 = none)
    #[arg(long, default_value = "5")]
    think_ms: u64,

    /// Controller status check interval in milliseconds
    #[arg(long, default_value = "200")]
    status_interval_ms: u64,

    /// Platform to emulate (local, kubernetes, marathon)
    #[arg(short = 'p', long, default_value = "local")]
    platform: String,

    /// Keep stores under this directory instead of a temporary one
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write divergence instrumentation to this JSON-lines file
    #[arg(long)]
    instrumentation: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

/// Opens the variable and tracking stores, durable or temporary.
fn open_stores(data_dir: &Option<PathBuf>) -> Result<(Arc<AtomicStore>, Arc<AtomicStore>), StoreError> {
    match data_dir {
        Some(dir) => Ok((
            Arc::new(AtomicStore::open(dir, "variables")?),
            Arc::new(AtomicStore::open(dir, "tracking")?),
        )),
        None => Ok((
            Arc::new(AtomicStore::temporary()?),
            Arc::new(AtomicStore::temporary()?),
        )),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("Driftlab Divergence Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    if args.clients == 0 {
        eprintln!("Error: at least one client is required");
        std::process::exit(1);
    }

    let orchestration: Orchestration = args.platform.parse().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("Available platforms: local, kubernetes, marathon");
        std::process::exit(1);
    });

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64
    } else {
        args.seed
    };

    let (variables, tracking) = open_stores(&args.data_dir).unwrap_or_else(|e| {
        eprintln!("Error: failed to open stores: {}", e);
        std::process::exit(1);
    });

    let counter = Arc::new(StoreCounter::open(variables, "event_counter").unwrap_or_else(|e| {
        eprintln!("Error: failed to open event counter: {}", e);
        std::process::exit(1);
    }));
    let tracker = Arc::new(StoreTracker::new(tracking, args.clients));

    let (instrumentation, instrumented): (Arc<dyn Instrumentation>, bool) =
        match &args.instrumentation {
            Some(path) => {
                let sink = FileInstrumentation::create(path).unwrap_or_else(|e| {
                    eprintln!("Error: failed to create instrumentation file: {}", e);
                    std::process::exit(1);
                });
                (Arc::new(sink), true)
            }
            None => (Arc::new(NullInstrumentation), false),
        };

    let config = ExperimentConfig::new()
        .with_max_events(args.max_events)
        .with_clients(args.clients)
        .with_instrumentation(instrumented)
        .with_orchestration(orchestration)
        .with_status_interval(Duration::from_millis(args.status_interval_ms));
    let expected = config.expected_events();

    let ctx = TokioContext::shared();
    let cluster = Arc::new(SimCluster::new());
    // Local runs have no control plane to tear down; emulated orchestrators
    // get the counting double so the summary can report dispatched stops.
    let sim_platform = Arc::new(SimPlatform::new());
    let platform: Arc<dyn Platform> = if orchestration.is_orchestrated() {
        Arc::clone(&sim_platform) as Arc<dyn Platform>
    } else {
        Arc::new(NullPlatform)
    };

    let controller = ExperimentController::new(
        config,
        NodeId::from_seed(base_seed),
        Arc::clone(&ctx),
        Collaborators {
            cluster: Arc::clone(&cluster) as Arc<dyn Cluster>,
            platform: Arc::clone(&platform),
            tracker: Arc::clone(&tracker) as Arc<dyn TaskTracker>,
            counter: Arc::clone(&counter) as Arc<dyn SharedCounter>,
            instrumentation,
        },
    );
    let run_state = controller.run_state();

    info!(
        "Spawning {} clients x {} events (seed={}, platform={})",
        args.clients, args.max_events, base_seed, orchestration
    );

    for i in 0..args.clients {
        let client_seed = base_seed.wrapping_add(i as u64 + 1);
        let client = ClientWorkload::new(
            NodeId::from_seed(client_seed),
            args.max_events,
            Arc::clone(&ctx),
            Arc::clone(&counter) as Arc<dyn SharedCounter>,
            Arc::clone(&tracker) as Arc<dyn TaskTracker>,
            run_state.clone(),
            client_seed,
        )
        .with_mean_delay(Duration::from_millis(args.think_ms))
        .with_duplicate_rate(args.duplicates);

        ctx.spawn(&format!("client-{}", i), client.run());
    }

    let report = match controller.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("✗ Experiment failed: {}", e);
            std::process::exit(1);
        }
    };

    let elapsed = ctx.now();

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "seed": base_seed,
            "clients": args.clients,
            "max_events": args.max_events,
            "platform": orchestration.name(),
            "platform_stops": sim_platform.total_stops(),
            "expected": report.expected,
            "observed": report.observed,
            "overcount": report.overcount,
            "percent": report.percent,
            "elapsed_secs": elapsed.as_secs_f64(),
        });
        println!("{}", serde_json::to_string_pretty(&summary).unwrap());
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("✓ Experiment completed in {:.2}s (seed={})", elapsed.as_secs_f64(), base_seed);
        if report.overcount == 0 {
            info!("✅ Exact convergence: {} events expected and observed", expected);
        } else {
            info!("Divergence: {}", report);
        }
    }
}
