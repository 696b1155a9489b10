use std::collections::BTreeMap;

use ygg_types::{MemberId, PartitionId, Priority};

use crate::member::{MemberState, MemberStatus, PartitionState, PartitionStatus};
use crate::topology::ClusterTopology;

/// A pure description of how an operation changes the topology.
///
/// Appliers return one from `init` (the in-progress state) and one from
/// `apply` (the confirmed state). All variants except `OverwriteReplicas`
/// touch only the member the operation targets; updates addressed to a member
/// or replica that does not exist leave the topology as it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Unchanged,
    MemberJoining,
    MemberActive,
    MemberLeaving,
    MemberRemoved,
    PartitionJoining { partition_id: PartitionId, priority: Priority },
    PartitionActive { partition_id: PartitionId },
    PartitionLeaving { partition_id: PartitionId },
    PartitionRemoved { partition_id: PartitionId },
    PartitionPriority { partition_id: PartitionId, priority: Priority },
    /// Replaces the replica set of a partition across all members.
    OverwriteReplicas { partition_id: PartitionId, replicas: BTreeMap<MemberId, Priority> },
}

impl StateUpdate {
    pub fn apply(self, member_id: &MemberId, topology: ClusterTopology) -> ClusterTopology {
        match self {
            StateUpdate::Unchanged => topology,
            StateUpdate::MemberJoining => topology.update_member(member_id, |m| {
                Some(match m {
                    Some(m) => m.with_status(MemberStatus::Joining),
                    None => MemberState::joining(),
                })
            }),
            StateUpdate::MemberActive => topology
                .update_member(member_id, |m| m.map(|m| m.with_status(MemberStatus::Active))),
            StateUpdate::MemberLeaving => topology
                .update_member(member_id, |m| m.map(|m| m.with_status(MemberStatus::Leaving))),
            StateUpdate::MemberRemoved => topology.update_member(member_id, |_| None),
            StateUpdate::PartitionJoining { partition_id, priority } => {
                topology.update_member(member_id, |m| {
                    m.map(|m| m.with_partition(partition_id, PartitionState::joining(priority)))
                })
            }
            StateUpdate::PartitionActive { partition_id } => {
                set_partition_status(topology, member_id, partition_id, PartitionStatus::Active)
            }
            StateUpdate::PartitionLeaving { partition_id } => {
                set_partition_status(topology, member_id, partition_id, PartitionStatus::Leaving)
            }
            StateUpdate::PartitionRemoved { partition_id } => topology
                .update_member(member_id, |m| m.map(|m| m.without_partition(partition_id))),
            StateUpdate::PartitionPriority { partition_id, priority } => {
                topology.update_member(member_id, |m| {
                    m.map(|m| {
                        m.update_partition(partition_id, |p| PartitionState { priority, ..p })
                    })
                })
            }
            StateUpdate::OverwriteReplicas { partition_id, replicas } => {
                topology.overwrite_partition_replicas(partition_id, &replicas)
            }
        }
    }
}

fn set_partition_status(
    topology: ClusterTopology,
    member_id: &MemberId,
    partition_id: PartitionId,
    status: PartitionStatus,
) -> ClusterTopology {
    topology.update_member(member_id, |m| {
        m.map(|m| m.update_partition(partition_id, |p| PartitionState { status, ..p }))
    })
}
