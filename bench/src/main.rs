//! Aistore tablespace benchmark tool
//!
//! Runs one lifecycle scenario from several threads against a single node
//! and reports throughput and latency.

use aistore_tblspc::acl::RoleRegistry;
use aistore_tblspc::{EngineConfig, TablespaceManager};
use clap::Parser;
use rand::SeedableRng;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod metrics;
mod scenarios;

use metrics::{Metrics, Outcome};
use scenarios::{BenchEnv, BenchResult, Scenario};

#[derive(Parser, Debug, Clone)]
#[command(name = "aistore-tblspc-bench")]
#[command(about = "Aistore tablespace lifecycle benchmark tool")]
struct Args {
    #[arg(short = 't', long, default_value = "1")]
    threads: usize,

    #[arg(short = 'd', long, default_value = "10")]
    duration: u64,

    /// create_drop, lookup, rename, move or temp_rotation
    #[arg(short = 's', long, default_value = "create_drop")]
    scenario: String,

    /// Tablespaces (lookup, temp_rotation) or relations per thread (move)
    #[arg(long, default_value = "8")]
    objects: usize,

    #[arg(short = 'w', long, default_value = "0")]
    warmup: u64,

    #[arg(long, default_value = "0")]
    seed: u64,

    /// Keep the data directory instead of a throw-away one
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

fn run_thread(
    thread_id: usize,
    env: &BenchEnv,
    scenario: &dyn Scenario,
    stop_flag: &AtomicBool,
    metrics: &Metrics,
    seed: u64,
) {
    let seed = seed.wrapping_add(thread_id as u64 * 0x9e3779b97f4a7c15);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut session = env.session();

    while !stop_flag.load(Ordering::Relaxed) {
        let start = Instant::now();
        let result = scenario.execute(env, &mut session, thread_id, &mut rng);
        let elapsed = start.elapsed().as_nanos() as u64;
        let outcome = Outcome::classify(&result);
        if let (Outcome::Failed, Err(err)) = (outcome, &result) {
            log::debug!("thread {}: {}", thread_id, err);
        }
        metrics.record(outcome, elapsed);
        session.take_notices();
    }
}

fn run(args: Args) -> BenchResult<()> {
    let Some(scenario) = scenarios::by_name(&args.scenario, args.objects) else {
        return Err(format!("Unknown scenario: {}", args.scenario).into());
    };

    let scratch = tempfile::TempDir::new()?;
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| scratch.path().join("data"));
    let env = BenchEnv {
        manager: TablespaceManager::open(EngineConfig::utility(&data_dir), Arc::new(RoleRegistry::new()))?,
        locations: scratch.path().join("locations"),
        threads: args.threads.max(1),
    };

    println!("Aistore Tablespace Benchmark");
    println!("============================");
    println!("Started: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("Scenario: {}", args.scenario);
    println!("Threads: {}", env.threads);
    println!("Duration: {}s", args.duration);
    println!("Objects: {}", args.objects);
    println!();

    println!("Initializing...");
    scenario.prepare(&env)?;
    println!("Initialization complete.");

    if args.warmup > 0 {
        println!("Warming up for {}s...", args.warmup);
        std::thread::sleep(Duration::from_secs(args.warmup));
    }

    let stop_flag = AtomicBool::new(false);
    let metrics = Metrics::new();

    println!("Running benchmark...");
    let start_time = Instant::now();
    std::thread::scope(|scope| {
        for thread_id in 0..env.threads {
            let (env, scenario, stop_flag, metrics) = (&env, scenario.as_ref(), &stop_flag, &metrics);
            scope.spawn(move || run_thread(thread_id, env, scenario, stop_flag, metrics, args.seed));
        }
        std::thread::sleep(Duration::from_secs(args.duration));
        stop_flag.store(true, Ordering::Relaxed);
    });
    let elapsed = start_time.elapsed();

    let total_ops = metrics.total_ops();
    let ops_per_sec = total_ops as f64 / elapsed.as_secs_f64();

    println!();
    println!("Lifecycle statistics:");
    println!("    operations:        {:>12} ({:.1} ops/s)", total_ops, ops_per_sec);
    println!(
        "    latency:           {:8.2} us (avg), {:8.2} us (max)",
        metrics.avg_latency_us(),
        metrics.max_latency_us()
    );
    println!("    conflicts:         {:>12}", metrics.conflicts());
    println!("    failures:          {:>12}", metrics.failures());
    println!("    tablespaces left:  {:>12}", env.manager.tablespace_count());

    env.manager.shutdown()?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("aistore-tblspc-bench: {}", err);
            ExitCode::FAILURE
        }
    }
}
