//! Node pool controller.
//!
//! Runs the controller against a cluster snapshot loaded from
//! `NODEPOOL_SNAPSHOT` and prints the resulting node and pool state as JSON
//! once the controller has nothing left to do. That is either an idle work
//! queue, or a queue whose only remaining work is periodic requeues (an
//! unconfigured pool, say) that left the cluster untouched for two settle
//! delays.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nodepool_controller::config::Config;
use nodepool_controller::{Controller, InMemoryCluster, Snapshot};
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often to check whether the controller has run out of work.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Consecutive idle polls before the run is considered finished.
const IDLE_POLLS_TO_FINISH: u32 = 3;

/// Decides when a dry run has finished.
struct Quiescence {
    window: Duration,
    idle_polls: u32,
    generation: u64,
    last_change: Instant,
}

impl Quiescence {
    fn new(window: Duration, generation: u64, now: Instant) -> Self {
        Self {
            window,
            idle_polls: 0,
            generation,
            last_change: now,
        }
    }

    /// Record one poll. Returns true once the run should stop.
    fn observe(&mut self, generation: u64, idle: bool, quiet: bool, now: Instant) -> bool {
        if generation != self.generation {
            self.generation = generation;
            self.last_change = now;
        }
        if idle {
            self.idle_polls += 1;
        } else {
            self.idle_polls = 0;
        }

        if self.idle_polls >= IDLE_POLLS_TO_FINISH {
            info!("Work queue is idle");
            return true;
        }
        if quiet && now.duration_since(self.last_change) >= self.window {
            info!(
                window_ms = self.window.as_millis() as u64,
                "Only periodic requeues remain and nothing has changed"
            );
            return true;
        }
        false
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(
        workers = config.controller.workers,
        settle_delay_ms = config.controller.settle_delay.as_millis() as u64,
        max_retries = config.controller.max_retries,
        "Configuration loaded"
    );

    let path = config
        .snapshot_path
        .clone()
        .context("NODEPOOL_SNAPSHOT must name a cluster snapshot to run against")?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;
    info!(
        pools = snapshot.pools.len(),
        nodes = snapshot.nodes.len(),
        "Loaded cluster snapshot"
    );

    let cluster = Arc::new(InMemoryCluster::from_snapshot(snapshot));
    let controller = Arc::new(Controller::new(
        cluster.clone(),
        cluster.clone(),
        config.controller.clone(),
    ));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let events = cluster.watch();
    let handle = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.run(events, shutdown_rx).await }
    });

    let mut quiescence = Quiescence::new(
        (config.controller.settle_delay * 2).max(IDLE_POLL * IDLE_POLLS_TO_FINISH),
        cluster.generation(),
        Instant::now(),
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(IDLE_POLL) => {
                let queue = controller.queue();
                if quiescence.observe(
                    cluster.generation(),
                    queue.is_idle(),
                    queue.is_quiet(),
                    Instant::now(),
                ) {
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        error!(error = %e, "Controller task panicked");
    }

    let state = cluster.snapshot();
    let report = json!({
        "nodes": state.nodes.iter().map(|node| json!({
            "name": node.name(),
            "currentConfiguration": node.current_configuration(),
            "desiredConfiguration": node.desired_configuration(),
            "state": node.update_state(),
        })).collect::<Vec<_>>(),
        "pools": state.pools.iter().map(|pool| json!({
            "name": pool.name,
            "status": pool.status,
        })).collect::<Vec<_>>(),
        "events": cluster.events(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
