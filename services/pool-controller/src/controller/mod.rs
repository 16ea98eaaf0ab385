//! The pool controller.
//!
//! Watch events are turned into pool keys by the triggers, keys flow through
//! a shared work queue, and a fixed set of workers reconciles one pool at a
//! time. A pool key is never reconciled by two workers at once.

pub mod candidates;
pub mod capacity;
pub mod mutator;
pub mod resolver;
pub mod status;
mod sync;
mod triggers;

use std::sync::Arc;
use std::time::Duration;

use nodepool_api::WatchEvent;
use nodepool_reconcile::{Backoff, ItemExponentialRateLimiter, WorkQueue};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::{ClusterApi, ClusterCache};
use crate::error::{ControllerError, ControllerResult};

pub use mutator::NodeMutator;
pub use sync::SyncOutcome;
pub use triggers::node_update_needs_sync;

/// How often to poll the cache while waiting for its initial sync.
const CACHE_SYNC_POLL: Duration = Duration::from_millis(100);

/// Pool controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    pub workers: usize,

    /// Delay before acting on a pool add or update, and before retrying an
    /// unconfigured pool.
    pub settle_delay: Duration,

    /// Failed passes retried with backoff before a key is dropped.
    pub max_retries: u32,

    /// Delay before a dropped key is tried again.
    pub drop_cooldown: Duration,

    /// Conflict retry policy for node writes.
    pub node_update_backoff: Backoff,

    /// Requeue delay after the first failure; doubles per failure.
    pub queue_base_delay: Duration,

    /// Upper bound on the requeue delay.
    pub queue_max_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            settle_delay: Duration::from_secs(5),
            max_retries: 15,
            drop_cooldown: Duration::from_secs(60),
            node_update_backoff: Backoff::default(),
            queue_base_delay: Duration::from_millis(5),
            queue_max_delay: Duration::from_secs(1000),
        }
    }
}

/// Reconciles pools against the nodes they own.
pub struct Controller {
    cache: Arc<dyn ClusterCache>,
    api: Arc<dyn ClusterApi>,
    mutator: NodeMutator,
    queue: WorkQueue<String>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        cache: Arc<dyn ClusterCache>,
        api: Arc<dyn ClusterApi>,
        config: ControllerConfig,
    ) -> Self {
        let limiter =
            ItemExponentialRateLimiter::new(config.queue_base_delay, config.queue_max_delay);
        Self {
            mutator: NodeMutator::new(Arc::clone(&api), config.node_update_backoff.clone()),
            queue: WorkQueue::with_rate_limiter("pools", limiter),
            cache,
            api,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Queue a pool for reconciliation now.
    pub fn enqueue(&self, pool: &str) {
        self.queue.add(pool.to_string());
    }

    /// Queue a pool for reconciliation after `delay`.
    pub fn enqueue_after(&self, pool: &str, delay: Duration) {
        self.queue.add_after(pool.to_string(), delay);
    }

    /// Run until `shutdown` flips to true.
    ///
    /// Events are consumed from `events` by a single dispatcher; reconcile
    /// passes run on `workers` worker tasks. On shutdown, queued keys are
    /// discarded and passes already running are allowed to finish.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(workers = self.config.workers, "Starting pool controller");

        while !self.cache.has_synced() {
            tokio::select! {
                _ = tokio::time::sleep(CACHE_SYNC_POLL) => {}
                _ = stopped(&mut shutdown) => {
                    info!("Shut down before caches synced");
                    return;
                }
            }
        }
        debug!("Caches synced");

        let dispatcher = tokio::spawn({
            let this = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            async move {
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(event) => this.handle_event(event),
                            None => break,
                        },
                        _ = stopped(&mut shutdown) => break,
                    }
                }
                debug!("Event dispatcher stopped");
            }
        });

        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|worker| {
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    while this.process_next_work_item().await {}
                    debug!(worker, "Worker stopped");
                })
            })
            .collect();

        stopped(&mut shutdown).await;
        info!("Shutting down pool controller");
        self.queue.shut_down();

        if let Err(e) = dispatcher.await {
            warn!(error = %e, "Event dispatcher ended abnormally");
        }
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Pool controller stopped");
    }

    /// Take one key off the queue and reconcile it. Returns false once the
    /// queue has been shut down.
    pub async fn process_next_work_item(self: &Arc<Self>) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        // A panicking pass must not take the worker down with it.
        let pass = tokio::spawn({
            let this = Arc::clone(self);
            let key = key.clone();
            async move { this.sync_pool(&key).await }
        });
        let result = match pass.await {
            Ok(result) => result,
            Err(e) => Err(ControllerError::Internal(format!("reconcile task failed: {e}"))),
        };

        self.handle_result(key.clone(), result);
        self.queue.done(&key);
        true
    }

    fn handle_result(&self, key: String, result: ControllerResult<SyncOutcome>) {
        match result {
            Ok(SyncOutcome::Synced) => self.queue.forget(&key),
            Ok(SyncOutcome::RequeueAfter(delay)) => {
                self.queue.forget(&key);
                self.queue.add_after(key, delay);
            }
            Err(e) => {
                let retries = self.queue.num_requeues(&key);
                if retries < self.config.max_retries {
                    warn!(pool = %key, error = %e, retries, "Error syncing pool");
                    self.queue.add_rate_limited(key);
                } else {
                    warn!(
                        pool = %key,
                        error = %e,
                        cooldown_secs = self.config.drop_cooldown.as_secs(),
                        "Dropping pool out of the queue"
                    );
                    self.queue.forget(&key);
                    self.queue.add_after(key, self.config.drop_cooldown);
                }
            }
        }
    }
}

/// Resolves once shutdown has been signalled or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
