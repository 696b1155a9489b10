use std::collections::BTreeSet;

use ygg_types::{MemberId, TopologyError};

use super::{current_distribution, TopologyChangeRequest};
use crate::distribution::rebalance;
use crate::operation::TopologyChangeOperation;
use crate::topology::ClusterTopology;

/// Spreads the existing partitions evenly over a set of known members.
pub struct PartitionReassignTransformer {
    members: BTreeSet<MemberId>,
    replication_factor: usize,
}

impl PartitionReassignTransformer {
    pub fn new(members: impl IntoIterator<Item = MemberId>, replication_factor: usize) -> Self {
        PartitionReassignTransformer { members: members.into_iter().collect(), replication_factor }
    }
}

impl TopologyChangeRequest for PartitionReassignTransformer {
    fn operations(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<TopologyChangeOperation>, TopologyError> {
        if let Some(unknown) = self.members.iter().find(|m| !topology.has_member(m)) {
            return Err(TopologyError::invalid(format!(
                "cannot reassign partitions to unknown member {unknown}"
            )));
        }
        let members: Vec<MemberId> = self.members.iter().cloned().collect();
        reassign_operations(topology, &members, self.replication_factor)
    }
}

/// Moves `topology`'s partitions onto `members`.
///
/// All joins come first, then priority changes, then leaves, so a partition
/// never has fewer replicas than it started with or ends with.
pub(crate) fn reassign_operations(
    topology: &ClusterTopology,
    members: &[MemberId],
    replication_factor: usize,
) -> Result<Vec<TopologyChangeOperation>, TopologyError> {
    if replication_factor == 0 {
        return Err(TopologyError::invalid("replication factor must be at least 1"));
    }
    if members.len() < replication_factor {
        return Err(TopologyError::invalid(format!(
            "{} members cannot hold {replication_factor} replicas per partition",
            members.len()
        )));
    }

    let current = current_distribution(topology);
    let target = rebalance(&current, members, replication_factor);

    let mut joins = Vec::new();
    let mut priorities = Vec::new();
    let mut leaves = Vec::new();
    for (partition_id, replicas) in &target {
        let Some(existing) = current.get(partition_id) else { continue };
        for (member_id, priority) in replicas {
            match existing.get(member_id) {
                None => joins.push(TopologyChangeOperation::partition_join(
                    member_id.clone(),
                    *partition_id,
                    *priority,
                )),
                Some(old) if old != priority => {
                    priorities.push(TopologyChangeOperation::reconfigure_priority(
                        member_id.clone(),
                        *partition_id,
                        *priority,
                    ))
                }
                Some(_) => {}
            }
        }
        for member_id in existing.keys().filter(|m| !replicas.contains_key(*m)) {
            leaves.push(TopologyChangeOperation::partition_leave(member_id.clone(), *partition_id));
        }
    }

    joins.extend(priorities);
    joins.extend(leaves);
    Ok(joins)
}
