// src/lib.rs

pub mod cli;
pub mod collab;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod model;
pub mod policy;
pub mod registry;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{EventEngine, SchedulerCore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the scheduler core (queues, nodes, first-fit policy)
/// - the event engine thread
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let core = SchedulerCore::from_config(&cfg)?;
    let engine = EventEngine::start(core)?;
    info!(config = %config_path.display(), "scheduler running");

    match args.run_for {
        Some(secs) => {
            serve_until(engine, async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Ok(())
            })
            .await
        }
        None => serve_until(engine, tokio::signal::ctrl_c()).await,
    }
}

/// Keep `engine` running until `stop_signal` resolves, then stop it.
///
/// The engine is stopped even when the signal fails; that error is returned
/// afterwards.
pub async fn serve_until<F>(mut engine: EventEngine, stop_signal: F) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let signalled = stop_signal.await;
    match &signalled {
        Ok(()) => info!("shutting down"),
        Err(e) => warn!(error = %e, "stop signal failed; shutting down"),
    }

    // Joining the engine thread blocks; keep it off the async workers.
    tokio::task::spawn_blocking(move || engine.stop()).await??;
    signalled?;
    Ok(())
}

/// Simple dry-run output: print queues and nodes in scheduling order.
fn print_dry_run(cfg: &ConfigFile) {
    println!("clustersched dry-run");
    println!(
        "  scheduler.tick_interval_ms = {}",
        cfg.scheduler.tick_interval_ms
    );
    println!(
        "  scheduler.max_schedule_attempts = {}",
        cfg.scheduler.max_schedule_attempts
    );
    println!(
        "  scheduler.first_fit_priority = {}",
        cfg.scheduler.first_fit_priority
    );
    println!();

    let mut queues: Vec<_> = cfg.queue.iter().enumerate().collect();
    queues.sort_by_key(|(order, q)| (std::cmp::Reverse(q.priority), *order));
    println!("queues ({}):", queues.len());
    for (_, queue) in queues {
        println!("  - {} (priority {})", queue.name, queue.priority);
    }

    println!("nodes ({}):", cfg.node.len());
    for node in cfg.node.iter() {
        println!("  - {}", node.name);
        println!("      slots: {}", node.slots);
        if !node.resources.is_empty() {
            println!("      resources: {:?}", node.resources);
        }
        if !node.online {
            println!("      online: false");
        }
    }

    if !cfg.telemetry.limits.is_empty() {
        println!("telemetry limits:");
        for (key, limit) in cfg.telemetry.limits.iter() {
            println!("  - {key} <= {limit}");
        }
    }

    debug!("dry-run complete (engine not started)");
}
