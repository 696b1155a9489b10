use std::collections::BTreeSet;

use ygg_types::{MemberId, PartitionId, TopologyError};

use super::{current_distribution, replica_load, TopologyChangeRequest};
use crate::operation::TopologyChangeOperation;
use crate::topology::ClusterTopology;

/// Removes members from the cluster.
///
/// Every replica of a removed member is moved off it first. When dropping the
/// replica would take the partition below the replication factor, a surviving
/// member joins the partition before the removed one leaves it; the survivor
/// inherits the leaving replica's priority. `MemberLeave` comes last, once the
/// member owns nothing. Members unknown to the topology are ignored.
pub struct RemoveMembersTransformer {
    members: BTreeSet<MemberId>,
    replication_factor: usize,
}

impl RemoveMembersTransformer {
    pub fn new(members: impl IntoIterator<Item = MemberId>, replication_factor: usize) -> Self {
        RemoveMembersTransformer { members: members.into_iter().collect(), replication_factor }
    }
}

impl TopologyChangeRequest for RemoveMembersTransformer {
    fn operations(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<TopologyChangeOperation>, TopologyError> {
        let removed: Vec<&MemberId> =
            self.members.iter().filter(|m| topology.has_member(m)).collect();
        if removed.is_empty() {
            return Ok(Vec::new());
        }
        let survivors: Vec<&MemberId> = topology
            .members()
            .iter()
            .filter(|(id, state)| !self.members.contains(*id) && state.is_active())
            .map(|(id, _)| id)
            .collect();

        let mut distribution = current_distribution(topology);
        let mut operations = Vec::new();
        for member_id in removed {
            let owned: Vec<PartitionId> = distribution
                .iter()
                .filter(|(_, replicas)| replicas.contains_key(member_id))
                .map(|(p, _)| *p)
                .collect();

            for partition_id in owned {
                let load = replica_load(&distribution);
                let Some(replicas) = distribution.get_mut(&partition_id) else { continue };
                let Some(priority) = replicas.get(member_id).copied() else { continue };

                let remaining = replicas.len() - 1;
                if remaining < self.replication_factor {
                    let replacement = survivors
                        .iter()
                        .filter(|s| !replicas.contains_key(**s))
                        .min_by_key(|s| (load.get(**s).copied().unwrap_or(0), **s))
                        .copied();
                    let Some(replacement) = replacement else {
                        return Err(TopologyError::invalid(format!(
                            "cannot remove member {member_id}: partition {partition_id} would keep \
                             {remaining} of {} replicas and no other member can host it",
                            self.replication_factor
                        )));
                    };
                    operations.push(TopologyChangeOperation::partition_join(
                        replacement.clone(),
                        partition_id,
                        priority,
                    ));
                    replicas.insert(replacement.clone(), priority);
                }

                operations.push(TopologyChangeOperation::partition_leave(
                    member_id.clone(),
                    partition_id,
                ));
                replicas.remove(member_id);
            }
            operations.push(TopologyChangeOperation::member_leave(member_id.clone()));
        }
        Ok(operations)
    }
}
