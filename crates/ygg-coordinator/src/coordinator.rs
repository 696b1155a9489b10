use std::sync::Arc;

use tokio::sync::Mutex;

use ygg_storage::TopologyStore;
use ygg_topology::transform::force_overwrite_plan;
use ygg_topology::{ClusterTopology, TopologyChangeOperation, TopologyChangeRequest};
use ygg_types::{MemberId, TopologyError};

use crate::appliers::{ApplierSettings, TopologyChangeAppliers};
use crate::executor::{NoopMembershipChangeExecutor, NoopPartitionChangeExecutor};

/// Outcome of a change request. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyChangeResult {
    /// The topology the request was planned against.
    pub current_topology: ClusterTopology,
    /// The topology once every operation has run.
    pub final_topology: ClusterTopology,
    /// Id of the started change; 0 when no change was started.
    pub change_id: u64,
    pub operations: Vec<TopologyChangeOperation>,
}

/// Validates, simulates and commits topology changes.
///
/// Requests are handled one at a time. The store is only written with a
/// compare-and-swap against the topology the request was planned on, so
/// writers outside this coordinator are detected as
/// `TopologyError::ConcurrentModification`. Committed changes are executed
/// by a [`TopologyChangeDriver`](crate::TopologyChangeDriver).
pub struct TopologyChangeCoordinator<S> {
    store: Arc<S>,
    simulator: TopologyChangeAppliers<NoopPartitionChangeExecutor, NoopMembershipChangeExecutor>,
    serial: Mutex<()>,
}

impl<S: TopologyStore> TopologyChangeCoordinator<S> {
    pub fn new(store: Arc<S>, settings: ApplierSettings) -> Self {
        TopologyChangeCoordinator {
            store,
            simulator: TopologyChangeAppliers::simulation(settings),
            serial: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ApplierSettings {
        self.simulator.settings()
    }

    pub async fn get_topology(&self) -> Result<ClusterTopology, TopologyError> {
        self.store.get_topology().await
    }

    /// Plans `request`, validates it by simulation and starts it.
    pub async fn apply_operations<R>(
        &self,
        request: &R,
    ) -> Result<TopologyChangeResult, TopologyError>
    where
        R: TopologyChangeRequest + ?Sized,
    {
        self.apply_or_dry_run(false, request).await
    }

    /// Like [`apply_operations`](Self::apply_operations) without writing
    /// anything.
    pub async fn simulate_operations<R>(
        &self,
        request: &R,
    ) -> Result<TopologyChangeResult, TopologyError>
    where
        R: TopologyChangeRequest + ?Sized,
    {
        self.apply_or_dry_run(true, request).await
    }

    async fn apply_or_dry_run<R>(
        &self,
        dry_run: bool,
        request: &R,
    ) -> Result<TopologyChangeResult, TopologyError>
    where
        R: TopologyChangeRequest + ?Sized,
    {
        let _serial = self.serial.lock().await;
        let current = self.store.get_topology().await?;
        let operations = request.operations(&current)?;

        if operations.is_empty() {
            let change_id = current.last_change().map_or(0, |c| c.id);
            return Ok(TopologyChangeResult {
                final_topology: current.clone(),
                current_topology: current,
                change_id,
                operations,
            });
        }
        if current.is_uninitialized() {
            return Err(TopologyError::OperationNotAllowed(
                "the cluster topology is not initialized yet".into(),
            ));
        }
        if let Some(plan) = current.pending_changes() {
            return Err(TopologyError::ConcurrentModification(format!(
                "change {} is still in progress",
                plan.id
            )));
        }

        let started = current.clone().start_topology_change(operations.clone())?;
        let final_topology = self.simulate(started.clone()).await?;

        if dry_run {
            tracing::debug!(operations = operations.len(), "simulated topology change");
            return Ok(TopologyChangeResult {
                current_topology: current,
                final_topology,
                change_id: 0,
                operations,
            });
        }

        let expected = current.clone();
        let stored = self
            .store
            .update_topology(move |stored| {
                if *stored != expected {
                    return Err(TopologyError::ConcurrentModification(
                        "the topology changed while the request was planned".into(),
                    ));
                }
                Ok(started)
            })
            .await?;
        let change_id = stored.pending_changes().map_or(0, |p| p.id);
        tracing::info!(change_id, operations = operations.len(), "started topology change");

        Ok(TopologyChangeResult { current_topology: current, final_topology, change_id, operations })
    }

    /// Stops the pending change `change_id` after the operation in flight.
    /// Completed operations stay applied.
    ///
    /// Validation runs on the stored topology inside the update, so progress
    /// made by the driver meanwhile does not fail the cancel.
    pub async fn cancel_change(&self, change_id: u64) -> Result<ClusterTopology, TopologyError> {
        let _serial = self.serial.lock().await;
        let cancelled = self
            .store
            .update_topology(move |stored| {
                validate_cancel(stored, change_id)?;
                Ok(stored.clone().cancel_pending_changes())
            })
            .await?;
        tracing::warn!(change_id, "cancelled topology change");
        Ok(cancelled)
    }

    /// Recovery path: drops `members_to_remove` and forces every partition
    /// onto its surviving replicas.
    ///
    /// The plan is stored without comparing against the planned-on topology.
    pub async fn force_overwrite_topology(
        &self,
        members_to_remove: &[MemberId],
    ) -> Result<TopologyChangeResult, TopologyError> {
        let _serial = self.serial.lock().await;
        let current = self.store.get_topology().await?;
        if current.is_uninitialized() {
            return Err(TopologyError::OperationNotAllowed(
                "the cluster topology is not initialized yet".into(),
            ));
        }
        if let Some(plan) = current.pending_changes() {
            return Err(TopologyError::ConcurrentModification(format!(
                "change {} is still in progress",
                plan.id
            )));
        }

        let plan = force_overwrite_plan(&current, members_to_remove)?;
        if !plan.lost_partitions.is_empty() {
            tracing::warn!(
                partitions = ?plan.lost_partitions,
                "no surviving replica; these partitions are lost"
            );
        }
        let operations = plan.operations;
        if operations.is_empty() {
            // Only members without surviving replicas were removed.
            let view = plan.topology;
            let stored = self.store.update_topology(move |_| Ok(view)).await?;
            tracing::warn!(removed = ?members_to_remove, "removed members by force");
            return Ok(TopologyChangeResult {
                current_topology: current,
                final_topology: stored,
                change_id: 0,
                operations,
            });
        }
        let started = plan.topology.start_topology_change(operations.clone())?;
        let final_topology = self.simulate(started.clone()).await?;

        let stored = self.store.update_topology(move |_| Ok(started)).await?;
        let change_id = stored.pending_changes().map_or(0, |p| p.id);
        tracing::warn!(
            change_id,
            removed = ?members_to_remove,
            operations = operations.len(),
            "started forced topology overwrite"
        );

        Ok(TopologyChangeResult { current_topology: current, final_topology, change_id, operations })
    }

    /// Runs every pending operation of `topology` with the no-op appliers.
    /// Any failure is reported as an invalid request.
    async fn simulate(&self, mut topology: ClusterTopology) -> Result<ClusterTopology, TopologyError> {
        while let Some(operation) = topology.next_pending_operation().cloned() {
            let member_id = operation.member_id().clone();
            let mut applier = self.simulator.applier(&operation);
            let in_progress = applier.init(&topology).map_err(as_invalid)?;
            topology = in_progress.apply(&member_id, topology);
            let confirmed = applier.apply().await.map_err(as_invalid)?;
            topology = topology.advance_topology_change(&member_id, confirmed).map_err(as_invalid)?;
        }
        Ok(topology)
    }
}

fn validate_cancel(topology: &ClusterTopology, change_id: u64) -> Result<(), TopologyError> {
    if topology.is_uninitialized() {
        return Err(TopologyError::invalid(
            "cannot cancel a change before the topology is initialized",
        ));
    }
    match topology.pending_changes() {
        None => Err(TopologyError::invalid(format!(
            "cannot cancel change {change_id}: no change is in progress"
        ))),
        Some(plan) if plan.id != change_id => Err(TopologyError::invalid(format!(
            "cannot cancel change {change_id}: change {} is in progress",
            plan.id
        ))),
        Some(_) => Ok(()),
    }
}

fn as_invalid(e: TopologyError) -> TopologyError {
    match e {
        TopologyError::InvalidRequest(_) => e,
        other => TopologyError::InvalidRequest(other.to_string()),
    }
}
