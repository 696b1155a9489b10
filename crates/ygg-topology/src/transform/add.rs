use std::collections::{BTreeMap, BTreeSet};

use ygg_types::{MemberId, TopologyError};

use super::TopologyChangeRequest;
use crate::operation::TopologyChangeOperation;
use crate::topology::ClusterTopology;

/// Adds members to the cluster and hands them replicas of partitions that are
/// below the replication factor.
///
/// New replicas never get a priority above the lowest existing replica of the
/// partition, so adding capacity does not move leadership.
pub struct AddMembersTransformer {
    members: BTreeSet<MemberId>,
    replication_factor: usize,
}

impl AddMembersTransformer {
    pub fn new(members: impl IntoIterator<Item = MemberId>, replication_factor: usize) -> Self {
        AddMembersTransformer { members: members.into_iter().collect(), replication_factor }
    }
}

impl TopologyChangeRequest for AddMembersTransformer {
    fn operations(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<TopologyChangeOperation>, TopologyError> {
        let new_members: Vec<&MemberId> =
            self.members.iter().filter(|m| !topology.has_member(m)).collect();
        if new_members.is_empty() {
            return Ok(Vec::new());
        }

        let mut operations: Vec<TopologyChangeOperation> = new_members
            .iter()
            .map(|m| TopologyChangeOperation::member_join((*m).clone()))
            .collect();

        let mut load: BTreeMap<&MemberId, usize> = new_members.iter().map(|m| (*m, 0)).collect();
        for partition_id in topology.partition_ids() {
            let replicas = topology.partition_replicas(partition_id);
            let lowest = replicas.values().map(|p| p.priority).min().unwrap_or(1);
            let priority = lowest.saturating_sub(1).max(1);

            let mut assigned: BTreeSet<&MemberId> = BTreeSet::new();
            let mut count = replicas.len();
            while count < self.replication_factor {
                let candidate = load
                    .iter()
                    .filter(|(m, _)| !assigned.contains(**m))
                    .min_by_key(|(m, n)| (**n, **m))
                    .map(|(m, _)| *m);
                let Some(member_id) = candidate else { break };
                operations.push(TopologyChangeOperation::partition_join(
                    member_id.clone(),
                    partition_id,
                    priority,
                ));
                assigned.insert(member_id);
                if let Some(n) = load.get_mut(member_id) {
                    *n += 1;
                }
                count += 1;
            }
        }
        Ok(operations)
    }
}
