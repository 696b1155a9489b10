//! Partition-to-member placement.

use std::collections::BTreeMap;

use ygg_types::{MemberId, PartitionId, Priority};

/// Replicas per partition, each with its priority.
pub type Distribution = BTreeMap<PartitionId, BTreeMap<MemberId, Priority>>;

/// Static placement: partition `p` (numbered from 1) lands on the
/// `replication_factor` members following offset `p - 1`, the first of them
/// with the highest priority.
pub fn round_robin(
    members: &[MemberId],
    partition_count: u32,
    replication_factor: usize,
) -> Distribution {
    let mut distribution = Distribution::new();
    if members.is_empty() {
        return distribution;
    }
    let replicas = replication_factor.min(members.len());
    for partition_id in 1..=partition_count {
        let offset = (partition_id - 1) as usize;
        let assigned = (0..replicas)
            .map(|j| {
                let member = members[(offset + j) % members.len()].clone();
                (member, (replicas - j) as Priority)
            })
            .collect();
        distribution.insert(partition_id, assigned);
    }
    distribution
}

/// Target placement of the partitions in `current` over `members`.
///
/// A current replica is kept as long as its member stays in `members` and
/// holds less than its fair share of replicas; the remaining slots go to the
/// least loaded members, current replicas winning ties. Current replicas come
/// first in the priority order, in their previous order, so leadership only
/// moves when the leader itself is moved away.
///
/// `members` must hold at least `replication_factor` distinct ids.
pub fn rebalance(
    current: &Distribution,
    members: &[MemberId],
    replication_factor: usize,
) -> Distribution {
    let mut target = Distribution::new();
    if members.is_empty() || current.is_empty() {
        return target;
    }
    let fair_share = current.len() * replication_factor / members.len();
    let mut load: BTreeMap<&MemberId, usize> = members.iter().map(|m| (m, 0)).collect();

    let mut chosen: BTreeMap<PartitionId, Vec<MemberId>> = BTreeMap::new();
    for (partition_id, replicas) in current {
        let mut kept = Vec::new();
        for member_id in by_priority(replicas) {
            if kept.len() == replication_factor {
                break;
            }
            if let Some(count) = load.get_mut(member_id) {
                if *count < fair_share {
                    *count += 1;
                    kept.push(member_id.clone());
                }
            }
        }
        chosen.insert(*partition_id, kept);
    }

    for (partition_id, mut replicas) in chosen {
        let existing = &current[&partition_id];
        while replicas.len() < replication_factor {
            let candidate = load
                .iter()
                .filter(|(m, _)| !replicas.contains(**m))
                .min_by_key(|(m, count)| (**count, !existing.contains_key(**m), (**m).clone()))
                .map(|(m, _)| (*m).clone());
            let Some(candidate) = candidate else { break };
            if let Some(count) = load.get_mut(&candidate) {
                *count += 1;
            }
            replicas.push(candidate);
        }

        let mut ordered: Vec<MemberId> = by_priority(existing)
            .filter(|m| replicas.contains(*m))
            .cloned()
            .collect();
        ordered.extend(replicas.into_iter().filter(|m| !existing.contains_key(m)));

        let count = ordered.len();
        let assigned = ordered
            .into_iter()
            .enumerate()
            .map(|(i, m)| (m, (count - i) as Priority))
            .collect();
        target.insert(partition_id, assigned);
    }
    target
}

/// Replica members by descending priority, ties by id.
fn by_priority(replicas: &BTreeMap<MemberId, Priority>) -> impl Iterator<Item = &MemberId> {
    let mut ordered: Vec<(&MemberId, &Priority)> = replicas.iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ordered.into_iter().map(|(m, _)| m)
}
