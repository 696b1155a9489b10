use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ygg_topology::{
    ClusterTopology, MemberState, MemberStatus, PartitionStatus, StateUpdate,
    TopologyChangeOperation,
};
use ygg_types::{MemberId, Priority, TopologyError};

use crate::executor::{
    MembershipChangeExecutor, NoopMembershipChangeExecutor, NoopPartitionChangeExecutor,
    PartitionChangeExecutor,
};

/// Knobs shared by every applier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ApplierSettings {
    /// Replicas every partition must keep. Transformers plan towards it and
    /// `PartitionLeave` may not go below it.
    pub replication_factor: usize,
    /// The member allowed to run `PartitionOverwriteConfiguration`.
    pub coordinator: Option<MemberId>,
}

impl Default for ApplierSettings {
    fn default() -> Self {
        ApplierSettings { replication_factor: 1, coordinator: None }
    }
}

/// Builds an [`OperationApplier`] for each operation, all sharing the same
/// executors.
pub struct TopologyChangeAppliers<P, M> {
    partitions: Arc<P>,
    membership: Arc<M>,
    settings: ApplierSettings,
}

impl<P, M> TopologyChangeAppliers<P, M>
where
    P: PartitionChangeExecutor,
    M: MembershipChangeExecutor,
{
    pub fn new(partitions: Arc<P>, membership: Arc<M>, settings: ApplierSettings) -> Self {
        TopologyChangeAppliers { partitions, membership, settings }
    }

    pub fn settings(&self) -> &ApplierSettings {
        &self.settings
    }

    pub fn applier(&self, operation: &TopologyChangeOperation) -> OperationApplier<P, M> {
        OperationApplier {
            operation: operation.clone(),
            partitions: self.partitions.clone(),
            membership: self.membership.clone(),
            settings: self.settings.clone(),
            replicas: BTreeMap::new(),
        }
    }
}

impl TopologyChangeAppliers<NoopPartitionChangeExecutor, NoopMembershipChangeExecutor> {
    /// Appliers whose `apply` has no side effect.
    pub fn simulation(settings: ApplierSettings) -> Self {
        Self::new(
            Arc::new(NoopPartitionChangeExecutor),
            Arc::new(NoopMembershipChangeExecutor),
            settings,
        )
    }
}

/// Two-phase execution of one operation.
///
/// `init` validates the operation against the topology it will run on and
/// returns the in-progress update. `apply` performs the side effect and
/// returns the confirmed update. `apply` must only be called after a
/// successful `init`.
pub struct OperationApplier<P, M> {
    operation: TopologyChangeOperation,
    partitions: Arc<P>,
    membership: Arc<M>,
    settings: ApplierSettings,
    /// Replica set captured by `init` for the executor call.
    replicas: BTreeMap<MemberId, Priority>,
}

impl<P, M> OperationApplier<P, M>
where
    P: PartitionChangeExecutor,
    M: MembershipChangeExecutor,
{
    pub fn operation(&self) -> &TopologyChangeOperation {
        &self.operation
    }

    pub fn init(&mut self, topology: &ClusterTopology) -> Result<StateUpdate, TopologyError> {
        let member_id = self.operation.member_id();
        match &self.operation {
            TopologyChangeOperation::MemberJoin { .. } => match topology.member(member_id) {
                Some(m) if m.status != MemberStatus::Joining => Err(TopologyError::invalid(
                    format!("member {member_id} is already part of the cluster"),
                )),
                _ => Ok(StateUpdate::MemberJoining),
            },

            TopologyChangeOperation::MemberLeave { .. } => {
                let member = existing_member(topology, member_id)?;
                if member.status == MemberStatus::Joining {
                    return Err(TopologyError::invalid(format!(
                        "member {member_id} has not finished joining"
                    )));
                }
                if !member.partitions.is_empty() {
                    return Err(TopologyError::invalid(format!(
                        "member {member_id} still replicates partitions {:?}",
                        member.partitions.keys().collect::<Vec<_>>()
                    )));
                }
                Ok(StateUpdate::MemberLeaving)
            }

            TopologyChangeOperation::PartitionJoin { partition_id, priority, .. } => {
                let member = active_member(topology, member_id)?;
                if let Some(replica) = member.partition(*partition_id) {
                    if replica.status != PartitionStatus::Joining {
                        return Err(TopologyError::invalid(format!(
                            "member {member_id} already replicates partition {partition_id}"
                        )));
                    }
                }
                let mut replicas: BTreeMap<MemberId, Priority> = topology
                    .partition_replicas(*partition_id)
                    .into_iter()
                    .filter(|(id, _)| id != member_id)
                    .map(|(id, state)| (id, state.priority))
                    .collect();
                if replicas.is_empty() {
                    return Err(TopologyError::invalid(format!(
                        "partition {partition_id} has no replicas to join"
                    )));
                }
                replicas.insert(member_id.clone(), *priority);
                self.replicas = replicas;
                Ok(StateUpdate::PartitionJoining { partition_id: *partition_id, priority: *priority })
            }

            TopologyChangeOperation::PartitionLeave { partition_id, .. } => {
                let member = active_member(topology, member_id)?;
                if !member.has_partition(*partition_id) {
                    return Err(TopologyError::invalid(format!(
                        "member {member_id} does not replicate partition {partition_id}"
                    )));
                }
                let remaining = topology.replica_count(*partition_id) - 1;
                let floor = self.settings.replication_factor.max(1);
                if remaining < floor {
                    return Err(TopologyError::invalid(format!(
                        "partition {partition_id} would keep {remaining} replicas, below the \
                         replication factor {floor}"
                    )));
                }
                Ok(StateUpdate::PartitionLeaving { partition_id: *partition_id })
            }

            TopologyChangeOperation::PartitionReconfigurePriority { partition_id, .. } => {
                let member = active_member(topology, member_id)?;
                match member.partition(*partition_id) {
                    Some(replica) if replica.status == PartitionStatus::Active => {
                        Ok(StateUpdate::Unchanged)
                    }
                    Some(_) => Err(TopologyError::invalid(format!(
                        "replica of partition {partition_id} on member {member_id} is not active"
                    ))),
                    None => Err(TopologyError::invalid(format!(
                        "member {member_id} does not replicate partition {partition_id}"
                    ))),
                }
            }

            TopologyChangeOperation::PartitionOverwriteConfiguration {
                partition_id,
                new_members,
                ..
            } => {
                if self.settings.coordinator.as_ref() != Some(member_id) {
                    return Err(TopologyError::invalid(format!(
                        "member {member_id} is not the coordinator and cannot overwrite partition \
                         {partition_id}"
                    )));
                }
                if new_members.is_empty() {
                    return Err(TopologyError::invalid(format!(
                        "partition {partition_id} needs at least one replica"
                    )));
                }
                let unique: BTreeSet<&MemberId> = new_members.iter().collect();
                if unique.len() != new_members.len() {
                    return Err(TopologyError::invalid(format!(
                        "duplicate members in the new configuration of partition {partition_id}"
                    )));
                }
                for new_member in new_members {
                    match topology.member(new_member) {
                        None => {
                            return Err(TopologyError::invalid(format!(
                                "unknown member {new_member}"
                            )))
                        }
                        Some(m) if m.status == MemberStatus::Leaving => {
                            return Err(TopologyError::invalid(format!(
                                "member {new_member} is leaving the cluster"
                            )))
                        }
                        Some(_) => {}
                    }
                }
                let count = new_members.len();
                self.replicas = new_members
                    .iter()
                    .enumerate()
                    .map(|(i, m)| (m.clone(), (count - i) as Priority))
                    .collect();
                Ok(StateUpdate::Unchanged)
            }

            TopologyChangeOperation::ForcePartitionReconfigure { partition_id, .. } => {
                let member = existing_member(topology, member_id)?;
                if !member.has_partition(*partition_id) {
                    return Err(TopologyError::invalid(format!(
                        "member {member_id} does not replicate partition {partition_id}"
                    )));
                }
                self.replicas = topology
                    .partition_replicas(*partition_id)
                    .into_iter()
                    .map(|(id, state)| (id, state.priority))
                    .collect();
                Ok(StateUpdate::Unchanged)
            }
        }
    }

    pub async fn apply(&self) -> Result<StateUpdate, TopologyError> {
        let member_id = self.operation.member_id();
        match &self.operation {
            TopologyChangeOperation::MemberJoin { .. } => {
                self.membership.add_member(member_id).await?;
                Ok(StateUpdate::MemberActive)
            }
            TopologyChangeOperation::MemberLeave { .. } => {
                self.membership.remove_member(member_id).await?;
                Ok(StateUpdate::MemberRemoved)
            }
            TopologyChangeOperation::PartitionJoin { partition_id, .. } => {
                self.partitions.join(member_id, *partition_id, &self.replicas).await?;
                Ok(StateUpdate::PartitionActive { partition_id: *partition_id })
            }
            TopologyChangeOperation::PartitionLeave { partition_id, .. } => {
                self.partitions.leave(member_id, *partition_id).await?;
                Ok(StateUpdate::PartitionRemoved { partition_id: *partition_id })
            }
            TopologyChangeOperation::PartitionReconfigurePriority {
                partition_id,
                priority,
                ..
            } => {
                self.partitions.reconfigure_priority(member_id, *partition_id, *priority).await?;
                Ok(StateUpdate::PartitionPriority { partition_id: *partition_id, priority: *priority })
            }
            TopologyChangeOperation::PartitionOverwriteConfiguration { partition_id, .. } => {
                self.partitions
                    .overwrite_configuration(member_id, *partition_id, &self.replicas)
                    .await?;
                Ok(StateUpdate::OverwriteReplicas {
                    partition_id: *partition_id,
                    replicas: self.replicas.clone(),
                })
            }
            TopologyChangeOperation::ForcePartitionReconfigure {
                partition_id,
                bootstrap,
                ..
            } => {
                let members: Vec<MemberId> = self.replicas.keys().cloned().collect();
                self.partitions
                    .force_reconfigure(member_id, *partition_id, &members, *bootstrap)
                    .await?;
                Ok(StateUpdate::PartitionActive { partition_id: *partition_id })
            }
        }
    }
}

fn existing_member<'a>(
    topology: &'a ClusterTopology,
    member_id: &MemberId,
) -> Result<&'a MemberState, TopologyError> {
    topology
        .member(member_id)
        .ok_or_else(|| TopologyError::invalid(format!("unknown member {member_id}")))
}

fn active_member<'a>(
    topology: &'a ClusterTopology,
    member_id: &MemberId,
) -> Result<&'a MemberState, TopologyError> {
    let member = existing_member(topology, member_id)?;
    if !member.is_active() {
        return Err(TopologyError::invalid(format!("member {member_id} is not active")));
    }
    Ok(member)
}
