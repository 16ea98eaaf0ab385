//! A single reconciliation pass over one pool.

use std::time::{Duration, Instant};

use chrono::Utc;
use nodepool_api::{LabelSelector, Pool};
use tracing::{debug, info, instrument};

use super::candidates::select_candidates;
use super::capacity::max_unavailable;
use super::resolver::{members_of, members_of_lenient};
use super::status::calculate_status;
use super::Controller;
use crate::client::EventRecord;
use crate::error::{ControllerError, ControllerResult};

/// What the queue should do with a pool key after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing more to do until the next event.
    Synced,

    /// Look at the pool again after the delay.
    RequeueAfter(Duration),
}

impl Controller {
    /// Reconcile the pool named `name`.
    ///
    /// Pools that are unconfigured, paused or being deleted only have their
    /// status refreshed. Otherwise the pass lists the pool's members, picks
    /// the nodes allowed to start updating and hands each of them the
    /// pool's target configuration.
    #[instrument(skip(self), fields(pool = %name))]
    pub async fn sync_pool(&self, name: &str) -> ControllerResult<SyncOutcome> {
        let started = Instant::now();
        debug!("Started syncing pool");

        let pool = match self.cache.get_pool(name) {
            Ok(pool) => pool,
            Err(e) if e.is_not_found() => {
                debug!("Pool has been deleted");
                return Ok(SyncOutcome::Synced);
            }
            Err(e) => return Err(e.into()),
        };

        if pool.target().is_empty() {
            debug!(
                delay_ms = self.config.settle_delay.as_millis() as u64,
                "Pool has no target configuration yet"
            );
            self.sync_status_only(&pool).await?;
            return Ok(SyncOutcome::RequeueAfter(self.config.settle_delay));
        }

        let selector = LabelSelector::compile(pool.spec.node_selector.as_ref()).map_err(
            |source| ControllerError::InvalidSelector {
                pool: pool.name.clone(),
                source,
            },
        )?;
        if selector.is_empty() {
            self.api
                .record_event(EventRecord::warning(
                    &pool.name,
                    "SelectingAll",
                    "This pool is selecting all nodes. A non-empty selector is required.",
                ))
                .await;
            return Ok(SyncOutcome::Synced);
        }

        if pool.is_deleting() || pool.spec.paused {
            self.sync_status_only(&pool).await?;
            return Ok(SyncOutcome::Synced);
        }

        let pools = self.cache.list_pools()?;
        let members = members_of(&pool, self.cache.list_nodes(&selector)?, &pools)?;

        let budget = max_unavailable(&pool, members.len()).map_err(|source| {
            ControllerError::InvalidBudget {
                pool: pool.name.clone(),
                source,
            }
        })?;

        let candidates = select_candidates(&pool, &members, budget);
        if !candidates.is_empty() {
            let configuration = self.cache.get_configuration(pool.target())?;
            info!(
                members = members.len(),
                budget,
                candidates = candidates.len(),
                configuration = %configuration.name,
                "Starting node updates"
            );
            for node in candidates {
                self.mutator
                    .converge_labels_and_taints(node, &configuration)
                    .await?;
                let signaled = self
                    .mutator
                    .set_desired_configuration(node.name(), pool.target())
                    .await?;
                if signaled {
                    self.api
                        .record_event(EventRecord::normal(
                            &pool.name,
                            "SetDesiredConfiguration",
                            format!("Targeted node {} to {}", node.name(), pool.target()),
                        ))
                        .await;
                }
            }
        }

        self.sync_status_only(&pool).await?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished syncing pool"
        );
        Ok(SyncOutcome::Synced)
    }

    /// Recompute the pool's status and write it if it changed.
    ///
    /// Members that cannot be resolved to a single pool are left out of the
    /// counts rather than failing the update.
    pub async fn sync_status_only(&self, pool: &Pool) -> ControllerResult<()> {
        let selector = LabelSelector::compile(pool.spec.node_selector.as_ref()).map_err(
            |source| ControllerError::InvalidSelector {
                pool: pool.name.clone(),
                source,
            },
        )?;

        let pools = self.cache.list_pools()?;
        let members = members_of_lenient(pool, self.cache.list_nodes(&selector)?, &pools)?;

        let status = calculate_status(pool, &members, Utc::now());
        if status == pool.status {
            return Ok(());
        }

        self.api.update_pool_status(&pool.name, &status).await?;
        debug!(
            machines = status.machine_count,
            updated = status.updated_machine_count,
            unavailable = status.unavailable_machine_count,
            degraded = status.degraded_machine_count,
            "Updated pool status"
        );
        Ok(())
    }
}
