use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use ygg_types::{MemberId, PartitionId, Priority, TopologyError};

use crate::distribution::round_robin;
use crate::member::{MemberState, PartitionState};
use crate::operation::TopologyChangeOperation;
use crate::plan::{ChangeStatus, ClusterChangePlan, CompletedChange};
use crate::update::StateUpdate;

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Immutable snapshot of the cluster: members, the replicas they host, and the
/// change in flight.
///
/// Every mutating method consumes the snapshot and returns a new one with a
/// bumped `version`, so two snapshots compare equal only if nothing happened
/// in between. The topology store relies on this for compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ClusterTopology {
    version: u64,
    initialized: bool,
    members: BTreeMap<MemberId, MemberState>,
    pending_changes: Option<ClusterChangePlan>,
    last_change: Option<CompletedChange>,
}

impl ClusterTopology {
    pub fn uninitialized() -> Self {
        ClusterTopology::default()
    }

    /// An initialized topology without members.
    pub fn init() -> Self {
        ClusterTopology { version: 1, initialized: true, ..ClusterTopology::default() }
    }

    /// An initialized topology with `partition_count` partitions spread
    /// round-robin over `members`, `replication_factor` replicas each.
    pub fn bootstrap(
        members: impl IntoIterator<Item = MemberId>,
        partition_count: u32,
        replication_factor: usize,
    ) -> Result<Self, TopologyError> {
        let members: BTreeSet<MemberId> = members.into_iter().collect();
        if members.is_empty() {
            return Err(TopologyError::invalid("cannot bootstrap a topology without members"));
        }
        if replication_factor == 0 || replication_factor > members.len() {
            return Err(TopologyError::invalid(format!(
                "replication factor {replication_factor} must be between 1 and the member count {}",
                members.len()
            )));
        }

        let ordered: Vec<MemberId> = members.into_iter().collect();
        let distribution = round_robin(&ordered, partition_count, replication_factor);

        let mut topology = ClusterTopology::init();
        for member_id in &ordered {
            let partitions = distribution
                .iter()
                .filter_map(|(partition_id, replicas)| {
                    replicas
                        .get(member_id)
                        .map(|priority| (*partition_id, PartitionState::active(*priority)))
                })
                .collect();
            topology = topology.add_member(member_id.clone(), MemberState::active(partitions));
        }
        Ok(topology)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_uninitialized(&self) -> bool {
        !self.initialized
    }

    pub fn members(&self) -> &BTreeMap<MemberId, MemberState> {
        &self.members
    }

    pub fn member(&self, member_id: &MemberId) -> Option<&MemberState> {
        self.members.get(member_id)
    }

    pub fn has_member(&self, member_id: &MemberId) -> bool {
        self.members.contains_key(member_id)
    }

    pub fn pending_changes(&self) -> Option<&ClusterChangePlan> {
        self.pending_changes.as_ref()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_changes
            .as_ref()
            .is_some_and(ClusterChangePlan::has_pending_operations)
    }

    pub fn next_pending_operation(&self) -> Option<&TopologyChangeOperation> {
        self.pending_changes.as_ref().and_then(ClusterChangePlan::next_operation)
    }

    pub fn last_change(&self) -> Option<&CompletedChange> {
        self.last_change.as_ref()
    }

    /// Every partition hosted by at least one member.
    pub fn partition_ids(&self) -> BTreeSet<PartitionId> {
        self.members
            .values()
            .flat_map(|m| m.partitions.keys().copied())
            .collect()
    }

    /// Members hosting `partition_id`, with their replica state.
    pub fn partition_replicas(&self, partition_id: PartitionId) -> BTreeMap<MemberId, PartitionState> {
        self.members
            .iter()
            .filter_map(|(id, m)| m.partition(partition_id).map(|p| (id.clone(), *p)))
            .collect()
    }

    pub fn replica_count(&self, partition_id: PartitionId) -> usize {
        self.members.values().filter(|m| m.has_partition(partition_id)).count()
    }

    pub fn add_member(self, member_id: MemberId, state: MemberState) -> Self {
        self.update_member(&member_id, |_| Some(state))
    }

    /// Rewrites one member. Returning `None` from `f` removes the member.
    pub fn update_member(
        mut self,
        member_id: &MemberId,
        f: impl FnOnce(Option<MemberState>) -> Option<MemberState>,
    ) -> Self {
        let current = self.members.remove(member_id);
        if let Some(updated) = f(current) {
            self.members.insert(member_id.clone(), updated);
        }
        self.version += 1;
        self
    }

    /// Makes exactly the members in `replicas` host `partition_id`, each as an
    /// active replica with the given priority.
    pub fn overwrite_partition_replicas(
        mut self,
        partition_id: PartitionId,
        replicas: &BTreeMap<MemberId, Priority>,
    ) -> Self {
        let members = std::mem::take(&mut self.members);
        self.members = members
            .into_iter()
            .map(|(id, state)| {
                let state = match replicas.get(&id) {
                    Some(priority) => {
                        state.with_partition(partition_id, PartitionState::active(*priority))
                    }
                    None => state.without_partition(partition_id),
                };
                (id, state)
            })
            .collect();
        self.version += 1;
        self
    }

    /// Starts a new change. Fails if `operations` is empty or another change
    /// is pending.
    pub fn start_topology_change(
        mut self,
        operations: Vec<TopologyChangeOperation>,
    ) -> Result<Self, TopologyError> {
        if let Some(plan) = &self.pending_changes {
            return Err(TopologyError::ConcurrentModification(format!(
                "change {} is still in progress",
                plan.id
            )));
        }
        if operations.is_empty() {
            return Err(TopologyError::invalid("a topology change needs at least one operation"));
        }
        let id = self.last_change.as_ref().map_or(0, |c| c.id) + 1;
        self.pending_changes = Some(ClusterChangePlan::new(id, operations));
        self.version += 1;
        Ok(self)
    }

    /// Completes the head pending operation, which must target `member_id`,
    /// by applying `update`. Finalizes the change once nothing is pending.
    pub fn advance_topology_change(
        self,
        member_id: &MemberId,
        update: StateUpdate,
    ) -> Result<Self, TopologyError> {
        match self.next_pending_operation() {
            Some(op) if op.member_id() == member_id => {}
            Some(op) => {
                return Err(TopologyError::internal(format!(
                    "next pending operation {op} does not belong to member {member_id}"
                )))
            }
            None => return Err(TopologyError::internal("no pending operation to advance")),
        }

        let mut topology = update.apply(member_id, self);
        if let Some(plan) = topology.pending_changes.take().map(ClusterChangePlan::advance) {
            if plan.has_pending_operations() {
                topology.pending_changes = Some(plan);
            } else {
                topology.last_change = Some(CompletedChange {
                    id: plan.id,
                    status: ChangeStatus::Completed,
                    operations: plan.completed_operations,
                    completed_at_ns: now_ns(),
                });
            }
        }
        topology.version += 1;
        Ok(topology)
    }

    /// Drops the remaining operations of the pending change. Operations that
    /// already completed stay applied.
    pub fn cancel_pending_changes(mut self) -> Self {
        if let Some(plan) = self.pending_changes.take() {
            self.last_change = Some(CompletedChange {
                id: plan.id,
                status: ChangeStatus::Cancelled,
                operations: plan.completed_operations,
                completed_at_ns: now_ns(),
            });
            self.version += 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{MemberStatus, PartitionStatus};

    fn three_members() -> ClusterTopology {
        ClusterTopology::bootstrap(["1".into(), "2".into(), "3".into()], 1, 3).unwrap()
    }

    #[test]
    fn bootstrap_distributes_round_robin() {
        let t = ClusterTopology::bootstrap(
            ["0".into(), "1".into(), "2".into()],
            3,
            2,
        )
        .unwrap();
        assert!(!t.is_uninitialized());
        assert_eq!(t.partition_ids(), BTreeSet::from([1, 2, 3]));
        for p in 1..=3 {
            assert_eq!(t.replica_count(p), 2);
        }
        // Partition 1 is led by the first member.
        let replicas = t.partition_replicas(1);
        assert_eq!(replicas[&MemberId::from("0")].priority, 2);
        assert_eq!(replicas[&MemberId::from("1")].priority, 1);
    }

    #[test]
    fn bootstrap_rejects_bad_replication_factor() {
        let err = ClusterTopology::bootstrap(["0".into()], 1, 2).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidRequest(_)));
        let err = ClusterTopology::bootstrap(Vec::<MemberId>::new(), 1, 1).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidRequest(_)));
    }

    #[test]
    fn uninitialized_by_default() {
        let t = ClusterTopology::uninitialized();
        assert!(t.is_uninitialized());
        assert!(!t.has_pending_changes());
        assert!(t.next_pending_operation().is_none());
    }

    #[test]
    fn start_change_allocates_increasing_ids() {
        let t = three_members();
        let op = TopologyChangeOperation::partition_leave("1", 1);

        let t = t.start_topology_change(vec![op.clone()]).unwrap();
        assert_eq!(t.pending_changes().unwrap().id, 1);
        assert_eq!(t.next_pending_operation(), Some(&op));

        let t = t
            .advance_topology_change(&"1".into(), StateUpdate::PartitionRemoved { partition_id: 1 })
            .unwrap();
        assert!(!t.has_pending_changes());
        assert_eq!(t.last_change().unwrap().id, 1);
        assert_eq!(t.last_change().unwrap().status, ChangeStatus::Completed);

        let t = t
            .start_topology_change(vec![TopologyChangeOperation::partition_leave("2", 1)])
            .unwrap();
        assert_eq!(t.pending_changes().unwrap().id, 2);
    }

    #[test]
    fn start_change_rejects_empty_and_concurrent() {
        let t = three_members();
        let err = t.clone().start_topology_change(vec![]).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidRequest(_)));

        let t = t
            .start_topology_change(vec![TopologyChangeOperation::partition_leave("1", 1)])
            .unwrap();
        let err = t
            .start_topology_change(vec![TopologyChangeOperation::partition_leave("2", 1)])
            .unwrap_err();
        assert!(matches!(err, TopologyError::ConcurrentModification(_)));
    }

    #[test]
    fn advance_applies_update_and_keeps_order() {
        let t = three_members()
            .start_topology_change(vec![
                TopologyChangeOperation::partition_leave("1", 1),
                TopologyChangeOperation::partition_leave("2", 1),
            ])
            .unwrap();

        let err = t
            .clone()
            .advance_topology_change(&"2".into(), StateUpdate::Unchanged)
            .unwrap_err();
        assert!(matches!(err, TopologyError::Internal(_)));

        let t = t
            .advance_topology_change(&"1".into(), StateUpdate::PartitionRemoved { partition_id: 1 })
            .unwrap();
        assert!(t.has_pending_changes());
        let plan = t.pending_changes().unwrap();
        assert_eq!(plan.completed_operations, vec![TopologyChangeOperation::partition_leave("1", 1)]);
        assert_eq!(plan.next_operation(), Some(&TopologyChangeOperation::partition_leave("2", 1)));
        assert!(!t.member(&"1".into()).unwrap().has_partition(1));
    }

    #[test]
    fn cancel_keeps_completed_operations() {
        let t = three_members()
            .start_topology_change(vec![
                TopologyChangeOperation::partition_leave("1", 1),
                TopologyChangeOperation::partition_leave("2", 1),
            ])
            .unwrap()
            .advance_topology_change(&"1".into(), StateUpdate::PartitionRemoved { partition_id: 1 })
            .unwrap();

        let cancelled = t.cancel_pending_changes();
        assert!(!cancelled.has_pending_changes());
        assert!(cancelled.pending_changes().is_none());
        let last = cancelled.last_change().unwrap();
        assert_eq!(last.status, ChangeStatus::Cancelled);
        assert_eq!(last.operations, vec![TopologyChangeOperation::partition_leave("1", 1)]);
        // The completed leave is not rolled back.
        assert_eq!(cancelled.replica_count(1), 2);
    }

    #[test]
    fn every_update_produces_a_different_snapshot() {
        let t = three_members();
        let updated = t
            .clone()
            .update_member(&"1".into(), |m| m.map(|m| m.with_status(MemberStatus::Leaving)));
        assert_ne!(t, updated);
        assert!(updated.version() > t.version());
        assert_eq!(t.clone(), t);
    }

    #[test]
    fn overwrite_replaces_replica_set() {
        let t = three_members().overwrite_partition_replicas(
            1,
            &BTreeMap::from([(MemberId::from("2"), 2), (MemberId::from("3"), 1)]),
        );
        let replicas = t.partition_replicas(1);
        assert_eq!(replicas.len(), 2);
        assert!(!replicas.contains_key(&MemberId::from("1")));
        assert_eq!(replicas[&MemberId::from("2")].priority, 2);
        assert_eq!(replicas[&MemberId::from("3")].status, PartitionStatus::Active);
    }
}
