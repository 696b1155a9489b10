//! Request transformers: turn a declarative intent into the ordered operations
//! that realize it on a given topology snapshot.
//!
//! Transformers are pure. They choose an order in which every intermediate
//! topology keeps each partition above its replication floor; the coordinator
//! verifies this by simulating the result before anything is stored.

mod add;
mod force;
mod reassign;
mod remove;
mod scale;

pub use add::AddMembersTransformer;
pub use force::{force_overwrite_plan, ForceOverwritePlan};
pub use reassign::PartitionReassignTransformer;
pub use remove::RemoveMembersTransformer;
pub use scale::ScaleTransformer;

use std::collections::BTreeMap;

use ygg_types::{MemberId, TopologyError};

use crate::distribution::Distribution;
use crate::operation::TopologyChangeOperation;
use crate::topology::ClusterTopology;

/// Produces the operations for one change request.
///
/// Implemented by every transformer and by plain closures, which is how
/// single-operation requests are expressed.
pub trait TopologyChangeRequest: Send + Sync {
    fn operations(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<TopologyChangeOperation>, TopologyError>;
}

impl<F> TopologyChangeRequest for F
where
    F: Fn(&ClusterTopology) -> Result<Vec<TopologyChangeOperation>, TopologyError> + Send + Sync,
{
    fn operations(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<TopologyChangeOperation>, TopologyError> {
        self(topology)
    }
}

/// Current placement of every partition, as priorities per member.
pub(crate) fn current_distribution(topology: &ClusterTopology) -> Distribution {
    topology
        .partition_ids()
        .into_iter()
        .map(|partition_id| {
            let replicas = topology
                .partition_replicas(partition_id)
                .into_iter()
                .map(|(member_id, state)| (member_id, state.priority))
                .collect();
            (partition_id, replicas)
        })
        .collect()
}

/// Number of replicas each member hosts in `distribution`.
pub(crate) fn replica_load(distribution: &Distribution) -> BTreeMap<MemberId, usize> {
    let mut load = BTreeMap::new();
    for replicas in distribution.values() {
        for member_id in replicas.keys() {
            *load.entry(member_id.clone()).or_insert(0) += 1;
        }
    }
    load
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeSet;

    use ygg_types::MemberId;

    use crate::member::{MemberState, MemberStatus};
    use crate::operation::TopologyChangeOperation;
    use crate::topology::ClusterTopology;
    use crate::update::StateUpdate;

    /// Plays `operations` against `topology` with the confirmed effect of each
    /// operation, returning every intermediate topology.
    pub fn replay(
        topology: &ClusterTopology,
        operations: &[TopologyChangeOperation],
    ) -> Vec<ClusterTopology> {
        let mut steps = Vec::new();
        let mut current = topology.clone();
        for op in operations {
            let update = match op {
                TopologyChangeOperation::MemberJoin { .. } => {
                    current = current.add_member(op.member_id().clone(), MemberState::joining());
                    StateUpdate::MemberActive
                }
                TopologyChangeOperation::MemberLeave { .. } => StateUpdate::MemberRemoved,
                TopologyChangeOperation::PartitionJoin { partition_id, priority, .. } => {
                    current = StateUpdate::PartitionJoining {
                        partition_id: *partition_id,
                        priority: *priority,
                    }
                    .apply(op.member_id(), current);
                    StateUpdate::PartitionActive { partition_id: *partition_id }
                }
                TopologyChangeOperation::PartitionLeave { partition_id, .. } => {
                    StateUpdate::PartitionRemoved { partition_id: *partition_id }
                }
                TopologyChangeOperation::PartitionReconfigurePriority {
                    partition_id,
                    priority,
                    ..
                } => StateUpdate::PartitionPriority { partition_id: *partition_id, priority: *priority },
                TopologyChangeOperation::PartitionOverwriteConfiguration { .. }
                | TopologyChangeOperation::ForcePartitionReconfigure { .. } => StateUpdate::Unchanged,
            };
            current = update.apply(op.member_id(), current);
            steps.push(current.clone());
        }
        steps
    }

    pub fn active_members(topology: &ClusterTopology) -> BTreeSet<MemberId> {
        topology
            .members()
            .iter()
            .filter(|(_, m)| m.status == MemberStatus::Active)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
