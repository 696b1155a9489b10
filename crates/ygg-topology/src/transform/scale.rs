use std::collections::BTreeSet;

use ygg_types::{MemberId, TopologyError};

use super::reassign::reassign_operations;
use super::TopologyChangeRequest;
use crate::operation::TopologyChangeOperation;
use crate::topology::ClusterTopology;

/// Resizes the cluster to exactly `members`: new members join, the partitions
/// are spread over the desired set, and everyone else leaves.
pub struct ScaleTransformer {
    members: BTreeSet<MemberId>,
    replication_factor: usize,
}

impl ScaleTransformer {
    pub fn new(members: impl IntoIterator<Item = MemberId>, replication_factor: usize) -> Self {
        ScaleTransformer { members: members.into_iter().collect(), replication_factor }
    }
}

impl TopologyChangeRequest for ScaleTransformer {
    fn operations(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<TopologyChangeOperation>, TopologyError> {
        if self.members.is_empty() {
            return Err(TopologyError::invalid("cannot scale to an empty cluster"));
        }
        let desired: Vec<MemberId> = self.members.iter().cloned().collect();
        let reassign = reassign_operations(topology, &desired, self.replication_factor)?;

        let joins = desired
            .iter()
            .filter(|m| !topology.has_member(m))
            .map(|m| TopologyChangeOperation::member_join(m.clone()));
        let leaves = topology
            .members()
            .keys()
            .filter(|m| !self.members.contains(*m))
            .map(|m| TopologyChangeOperation::member_leave(m.clone()));

        Ok(joins.chain(reassign).chain(leaves).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::{active_members, replay};

    fn members(raw: &[&str]) -> Vec<MemberId> {
        raw.iter().map(|s| MemberId::from(*s)).collect()
    }

    #[test]
    fn scale_up_joins_before_moving_partitions() {
        let t = ClusterTopology::bootstrap(members(&["0", "1"]), 4, 2).unwrap();
        let ops = ScaleTransformer::new(members(&["0", "1", "2"]), 2).operations(&t).unwrap();

        assert_eq!(ops[0], TopologyChangeOperation::member_join("2"));
        let last = replay(&t, &ops).pop().unwrap();
        assert_eq!(active_members(&last), members(&["0", "1", "2"]).into_iter().collect::<BTreeSet<_>>());
        for partition_id in 1..=4 {
            assert_eq!(last.replica_count(partition_id), 2);
        }
        assert!(!last.member(&MemberId::from("2")).unwrap().partitions.is_empty());
    }

    #[test]
    fn scale_down_leaves_last() {
        let t = ClusterTopology::bootstrap(members(&["0", "1", "2"]), 3, 2).unwrap();
        let ops = ScaleTransformer::new(members(&["0", "1"]), 2).operations(&t).unwrap();

        assert_eq!(ops.last(), Some(&TopologyChangeOperation::member_leave("2")));
        let steps = replay(&t, &ops);
        for step in &steps {
            for partition_id in 1..=3 {
                assert!(step.replica_count(partition_id) >= 2);
            }
        }
        let last = steps.last().unwrap();
        assert_eq!(active_members(last), members(&["0", "1"]).into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn unchanged_membership_is_a_noop() {
        let t = ClusterTopology::bootstrap(members(&["0", "1", "2"]), 3, 2).unwrap();
        let ops = ScaleTransformer::new(members(&["0", "1", "2"]), 2).operations(&t).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn rejects_fewer_members_than_replicas() {
        let t = ClusterTopology::bootstrap(members(&["0", "1", "2"]), 3, 3).unwrap();
        let err = ScaleTransformer::new(members(&["0", "1"]), 3).operations(&t).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidRequest(_)));
    }
}
