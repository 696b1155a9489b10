use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ygg_storage::TopologyStore;
use ygg_topology::TopologyChangeOperation;
use ygg_types::TopologyError;

use crate::appliers::TopologyChangeAppliers;
use crate::executor::{MembershipChangeExecutor, PartitionChangeExecutor};

/// Executes committed changes with real executors, one operation at a time.
///
/// Each operation is persisted twice: its in-progress state before the side
/// effect runs and its confirmed state once it finished. An operation that
/// fails keeps its in-progress state and the change stays pending; nothing is
/// rolled back.
pub struct TopologyChangeDriver<S, P, M> {
    store: Arc<S>,
    appliers: TopologyChangeAppliers<P, M>,
}

impl<S, P, M> TopologyChangeDriver<S, P, M>
where
    S: TopologyStore,
    P: PartitionChangeExecutor,
    M: MembershipChangeExecutor,
{
    pub fn new(store: Arc<S>, appliers: TopologyChangeAppliers<P, M>) -> Self {
        TopologyChangeDriver { store, appliers }
    }

    /// Runs the next pending operation. Returns `None` when no change is
    /// pending.
    pub async fn advance_once(&self) -> Result<Option<TopologyChangeOperation>, TopologyError> {
        let topology = self.store.get_topology().await?;
        let Some(plan) = topology.pending_changes() else {
            return Ok(None);
        };
        let change_id = plan.id;
        let Some(operation) = plan.next_operation().cloned() else {
            return Ok(None);
        };
        let member_id = operation.member_id().clone();

        let mut applier = self.appliers.applier(&operation);
        let in_progress = applier.init(&topology).inspect_err(|e| {
            tracing::warn!(change_id, %operation, error = %e, "topology operation rejected");
        })?;

        let (expected_op, init_member) = (operation.clone(), member_id.clone());
        self.store
            .update_topology(move |current| {
                let still_next = current.pending_changes().is_some_and(|p| {
                    p.id == change_id && p.next_operation() == Some(&expected_op)
                });
                if !still_next {
                    return Err(TopologyError::ConcurrentModification(format!(
                        "change {change_id} moved on before {expected_op} started"
                    )));
                }
                Ok(in_progress.apply(&init_member, current.clone()))
            })
            .await?;

        let confirmed = applier.apply().await.inspect_err(|e| {
            tracing::warn!(change_id, %operation, error = %e, "topology operation failed");
        })?;

        let (expected_op, done_member) = (operation.clone(), member_id);
        let stored = self
            .store
            .update_topology(move |current| {
                let still_next = current.pending_changes().is_some_and(|p| {
                    p.id == change_id && p.next_operation() == Some(&expected_op)
                });
                if still_next {
                    current.clone().advance_topology_change(&done_member, confirmed)
                } else {
                    // Cancelled while the operation ran; keep what it did.
                    Ok(confirmed.apply(&done_member, current.clone()))
                }
            })
            .await?;

        if stored.pending_changes().is_some_and(|p| p.id == change_id) {
            tracing::info!(change_id, %operation, "applied topology operation");
        } else {
            tracing::info!(change_id, %operation, "applied last topology operation of change");
        }
        Ok(Some(operation))
    }

    /// Runs operations until no change is pending. Returns how many ran.
    pub async fn run_to_completion(&self) -> Result<usize, TopologyError> {
        let mut applied = 0;
        while self.advance_once().await?.is_some() {
            applied += 1;
        }
        Ok(applied)
    }

    /// Polls for pending operations every `interval` until `shutdown`
    /// resolves. Failed operations are logged and retried on the next tick.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("topology change driver stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_to_completion().await {
                        tracing::warn!(error = %e, "topology change driver tick failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use tokio::sync::Notify;
    use ygg_storage::MemTopologyStore;
    use ygg_topology::transform::ScaleTransformer;
    use ygg_topology::{ChangeStatus, ClusterTopology};
    use ygg_types::{MemberId, PartitionId, Priority};

    use super::*;
    use crate::appliers::ApplierSettings;
    use crate::coordinator::TopologyChangeCoordinator;

    /// Records every side effect; fails leaves while `fail_leave` is set.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_leave: AtomicBool,
        /// When set, `join` waits for a notification before returning.
        gate: Option<Arc<Notify>>,
    }

    impl Recorder {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PartitionChangeExecutor for Recorder {
        async fn join(
            &self,
            member_id: &MemberId,
            partition_id: PartitionId,
            _priorities: &BTreeMap<MemberId, Priority>,
        ) -> Result<(), TopologyError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.record(format!("join {member_id} {partition_id}"));
            Ok(())
        }

        async fn leave(&self, member_id: &MemberId, partition_id: PartitionId) -> Result<(), TopologyError> {
            if self.fail_leave.load(Ordering::SeqCst) {
                return Err(TopologyError::internal("member unreachable"));
            }
            self.record(format!("leave {member_id} {partition_id}"));
            Ok(())
        }

        async fn reconfigure_priority(
            &self,
            member_id: &MemberId,
            partition_id: PartitionId,
            priority: Priority,
        ) -> Result<(), TopologyError> {
            self.record(format!("priority {member_id} {partition_id} {priority}"));
            Ok(())
        }

        async fn force_reconfigure(
            &self,
            member_id: &MemberId,
            partition_id: PartitionId,
            _members: &[MemberId],
            bootstrap: bool,
        ) -> Result<(), TopologyError> {
            self.record(format!("force {member_id} {partition_id} {bootstrap}"));
            Ok(())
        }

        async fn overwrite_configuration(
            &self,
            member_id: &MemberId,
            partition_id: PartitionId,
            _replicas: &BTreeMap<MemberId, Priority>,
        ) -> Result<(), TopologyError> {
            self.record(format!("overwrite {member_id} {partition_id}"));
            Ok(())
        }
    }

    impl MembershipChangeExecutor for Recorder {
        async fn add_member(&self, member_id: &MemberId) -> Result<(), TopologyError> {
            self.record(format!("add {member_id}"));
            Ok(())
        }

        async fn remove_member(&self, member_id: &MemberId) -> Result<(), TopologyError> {
            self.record(format!("remove {member_id}"));
            Ok(())
        }
    }

    fn ids(raw: &[&str]) -> Vec<MemberId> {
        raw.iter().map(|s| MemberId::from(*s)).collect()
    }

    fn setup(
        topology: ClusterTopology,
        recorder: Recorder,
    ) -> (
        Arc<MemTopologyStore>,
        TopologyChangeCoordinator<MemTopologyStore>,
        TopologyChangeDriver<MemTopologyStore, Recorder, Recorder>,
        Arc<Recorder>,
    ) {
        let store = Arc::new(MemTopologyStore::new(topology));
        let recorder = Arc::new(recorder);
        let coordinator = TopologyChangeCoordinator::new(store.clone(), ApplierSettings::default());
        let appliers = TopologyChangeAppliers::new(
            recorder.clone(),
            recorder.clone(),
            ApplierSettings::default(),
        );
        (store.clone(), coordinator, TopologyChangeDriver::new(store, appliers), recorder)
    }

    #[tokio::test]
    async fn nothing_pending() {
        let t = ClusterTopology::bootstrap(ids(&["1"]), 1, 1).unwrap();
        let (_, _, driver, recorder) = setup(t, Recorder::default());
        assert_eq!(driver.advance_once().await.unwrap(), None);
        assert_eq!(driver.run_to_completion().await.unwrap(), 0);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn reaches_the_simulated_topology() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2"]), 4, 2).unwrap();
        let (store, coordinator, driver, recorder) = setup(t, Recorder::default());

        let planned = coordinator
            .apply_operations(&ScaleTransformer::new(ids(&["1", "2", "3"]), 2))
            .await
            .unwrap();
        let applied = driver.run_to_completion().await.unwrap();
        assert_eq!(applied, planned.operations.len());

        let done = store.get_topology().await.unwrap();
        assert!(!done.has_pending_changes());
        assert_eq!(done.members(), planned.final_topology.members());
        let last = done.last_change().unwrap();
        assert_eq!(last.status, ChangeStatus::Completed);
        assert_eq!(last.operations, planned.operations);
        assert_eq!(recorder.calls()[0], "add 3");
    }

    #[tokio::test]
    async fn failed_apply_leaves_change_pending() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2", "3"]), 1, 3).unwrap();
        let recorder = Recorder { fail_leave: AtomicBool::new(true), ..Default::default() };
        let (store, coordinator, driver, recorder) = setup(t, recorder);

        let leave = |_: &ClusterTopology| -> Result<Vec<TopologyChangeOperation>, TopologyError> {
            Ok(vec![TopologyChangeOperation::partition_leave("1", 1)])
        };
        coordinator.apply_operations(&leave).await.unwrap();

        let err = driver.advance_once().await.unwrap_err();
        assert!(matches!(err, TopologyError::Internal(_)));
        let stuck = store.get_topology().await.unwrap();
        assert!(stuck.has_pending_changes());
        let replica = stuck.member(&MemberId::from("1")).unwrap().partition(1).copied().unwrap();
        assert_eq!(replica.status, ygg_topology::PartitionStatus::Leaving);

        // The member recovered: the next attempt resumes the same operation.
        recorder.fail_leave.store(false, Ordering::SeqCst);
        assert_eq!(driver.run_to_completion().await.unwrap(), 1);
        let done = store.get_topology().await.unwrap();
        assert!(!done.has_pending_changes());
        assert_eq!(done.replica_count(1), 2);
        assert_eq!(recorder.calls(), vec!["leave 1 1"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_during_apply_keeps_the_finished_operation() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2", "3"]), 1, 1).unwrap();
        let gate = Arc::new(Notify::new());
        let recorder = Recorder { gate: Some(gate.clone()), ..Default::default() };
        let (store, coordinator, driver, _) = setup(t, recorder);

        let joins = |_: &ClusterTopology| -> Result<Vec<TopologyChangeOperation>, TopologyError> {
            Ok(vec![
                TopologyChangeOperation::partition_join("2", 1, 1),
                TopologyChangeOperation::partition_join("3", 1, 1),
            ])
        };
        let started = coordinator.apply_operations(&joins).await.unwrap();

        let driver = Arc::new(driver);
        let running = tokio::spawn({
            let driver = driver.clone();
            async move { driver.advance_once().await }
        });
        // Wait until the join is in flight, then cancel.
        loop {
            let t = store.get_topology().await.unwrap();
            if t.member(&MemberId::from("2")).unwrap().has_partition(1) {
                break;
            }
            tokio::task::yield_now().await;
        }
        coordinator.cancel_change(started.change_id).await.unwrap();
        gate.notify_one();

        let applied = running.await.unwrap().unwrap();
        assert_eq!(applied, Some(TopologyChangeOperation::partition_join("2", 1, 1)));

        let t = store.get_topology().await.unwrap();
        assert!(!t.has_pending_changes());
        assert_eq!(t.last_change().unwrap().status, ChangeStatus::Cancelled);
        let replica = t.member(&MemberId::from("2")).unwrap().partition(1).copied().unwrap();
        assert_eq!(replica.status, ygg_topology::PartitionStatus::Active);
        assert!(!t.member(&MemberId::from("3")).unwrap().has_partition(1));
        assert_eq!(driver.advance_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2"]), 2, 1).unwrap();
        let (store, coordinator, driver, _) = setup(t, Recorder::default());
        coordinator
            .apply_operations(&ScaleTransformer::new(ids(&["1", "2", "3"]), 1))
            .await
            .unwrap();

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let store_clone = store.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if !store_clone.get_topology().await.unwrap().has_pending_changes() {
                    let _ = stop.send(());
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        driver
            .run(Duration::from_millis(10), async {
                let _ = stopped.await;
            })
            .await;
        watcher.await.unwrap();
        assert!(!store.get_topology().await.unwrap().has_pending_changes());
    }
}
