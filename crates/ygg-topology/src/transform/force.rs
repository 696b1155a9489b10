use std::collections::BTreeSet;

use ygg_types::{MemberId, PartitionId, TopologyError};

use crate::operation::TopologyChangeOperation;
use crate::topology::ClusterTopology;

/// Recovery plan that drops unreachable members and makes the survivors
/// reconfigure every partition among themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceOverwritePlan {
    /// The topology without the removed members. The plan starts from here.
    pub topology: ClusterTopology,
    pub operations: Vec<TopologyChangeOperation>,
    /// Partitions whose every replica was on a removed member.
    pub lost_partitions: BTreeSet<PartitionId>,
}

/// Builds the recovery plan that removes `members_to_remove`.
///
/// For every partition each surviving replica gets a
/// `ForcePartitionReconfigure`; the last survivor (by member id) is the single
/// bootstrap replica.
pub fn force_overwrite_plan(
    topology: &ClusterTopology,
    members_to_remove: &[MemberId],
) -> Result<ForceOverwritePlan, TopologyError> {
    let removed: BTreeSet<&MemberId> =
        members_to_remove.iter().filter(|m| topology.has_member(m)).collect();
    if removed.is_empty() {
        return Err(TopologyError::invalid("none of the members to remove are part of the cluster"));
    }
    if removed.len() == topology.members().len() {
        return Err(TopologyError::invalid("cannot remove every member of the cluster"));
    }

    let partitions = topology.partition_ids();
    let view = removed
        .iter()
        .fold(topology.clone(), |t, m| t.update_member(m, |_| None));

    let mut operations = Vec::new();
    let mut lost_partitions = BTreeSet::new();
    for partition_id in partitions {
        let owners: Vec<MemberId> = view.partition_replicas(partition_id).into_keys().collect();
        let Some((last, rest)) = owners.split_last() else {
            lost_partitions.insert(partition_id);
            continue;
        };
        operations.extend(
            rest.iter()
                .map(|m| TopologyChangeOperation::force_reconfigure(m.clone(), partition_id, false)),
        );
        operations.push(TopologyChangeOperation::force_reconfigure(last.clone(), partition_id, true));
    }

    Ok(ForceOverwritePlan { topology: view, operations, lost_partitions })
}
