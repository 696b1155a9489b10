use std::fmt;

use ygg_types::{MemberId, PartitionId, Priority};

/// A single step of a topology change. Operations of a change run strictly in
/// order, each one on the member it names.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TopologyChangeOperation {
    MemberJoin {
        member_id: MemberId,
    },
    MemberLeave {
        member_id: MemberId,
    },
    PartitionJoin {
        member_id: MemberId,
        partition_id: PartitionId,
        priority: Priority,
    },
    PartitionLeave {
        member_id: MemberId,
        partition_id: PartitionId,
    },
    PartitionReconfigurePriority {
        member_id: MemberId,
        partition_id: PartitionId,
        priority: Priority,
    },
    /// Replaces the whole replica set of a partition. Runs on the coordinator.
    PartitionOverwriteConfiguration {
        member_id: MemberId,
        partition_id: PartitionId,
        new_members: Vec<MemberId>,
    },
    /// Recovery only: declares the member an owner of the partition, skipping
    /// replication checks. Exactly one owner per partition bootstraps.
    ForcePartitionReconfigure {
        member_id: MemberId,
        partition_id: PartitionId,
        bootstrap: bool,
    },
}

impl TopologyChangeOperation {
    pub fn member_id(&self) -> &MemberId {
        match self {
            TopologyChangeOperation::MemberJoin { member_id }
            | TopologyChangeOperation::MemberLeave { member_id }
            | TopologyChangeOperation::PartitionJoin { member_id, .. }
            | TopologyChangeOperation::PartitionLeave { member_id, .. }
            | TopologyChangeOperation::PartitionReconfigurePriority { member_id, .. }
            | TopologyChangeOperation::PartitionOverwriteConfiguration { member_id, .. }
            | TopologyChangeOperation::ForcePartitionReconfigure { member_id, .. } => member_id,
        }
    }

    /// `None` for membership operations.
    pub fn partition_id(&self) -> Option<PartitionId> {
        match self {
            TopologyChangeOperation::MemberJoin { .. }
            | TopologyChangeOperation::MemberLeave { .. } => None,
            TopologyChangeOperation::PartitionJoin { partition_id, .. }
            | TopologyChangeOperation::PartitionLeave { partition_id, .. }
            | TopologyChangeOperation::PartitionReconfigurePriority { partition_id, .. }
            | TopologyChangeOperation::PartitionOverwriteConfiguration { partition_id, .. }
            | TopologyChangeOperation::ForcePartitionReconfigure { partition_id, .. } => {
                Some(*partition_id)
            }
        }
    }

    pub fn member_join(member_id: impl Into<MemberId>) -> Self {
        TopologyChangeOperation::MemberJoin { member_id: member_id.into() }
    }

    pub fn member_leave(member_id: impl Into<MemberId>) -> Self {
        TopologyChangeOperation::MemberLeave { member_id: member_id.into() }
    }

    pub fn partition_join(
        member_id: impl Into<MemberId>,
        partition_id: PartitionId,
        priority: Priority,
    ) -> Self {
        TopologyChangeOperation::PartitionJoin { member_id: member_id.into(), partition_id, priority }
    }

    pub fn partition_leave(member_id: impl Into<MemberId>, partition_id: PartitionId) -> Self {
        TopologyChangeOperation::PartitionLeave { member_id: member_id.into(), partition_id }
    }

    pub fn reconfigure_priority(
        member_id: impl Into<MemberId>,
        partition_id: PartitionId,
        priority: Priority,
    ) -> Self {
        TopologyChangeOperation::PartitionReconfigurePriority {
            member_id: member_id.into(),
            partition_id,
            priority,
        }
    }

    pub fn force_reconfigure(
        member_id: impl Into<MemberId>,
        partition_id: PartitionId,
        bootstrap: bool,
    ) -> Self {
        TopologyChangeOperation::ForcePartitionReconfigure {
            member_id: member_id.into(),
            partition_id,
            bootstrap,
        }
    }
}

impl fmt::Display for TopologyChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyChangeOperation::MemberJoin { member_id } => {
                write!(f, "MemberJoin({member_id})")
            }
            TopologyChangeOperation::MemberLeave { member_id } => {
                write!(f, "MemberLeave({member_id})")
            }
            TopologyChangeOperation::PartitionJoin { member_id, partition_id, priority } => {
                write!(f, "PartitionJoin({member_id}, {partition_id}, priority={priority})")
            }
            TopologyChangeOperation::PartitionLeave { member_id, partition_id } => {
                write!(f, "PartitionLeave({member_id}, {partition_id})")
            }
            TopologyChangeOperation::PartitionReconfigurePriority {
                member_id,
                partition_id,
                priority,
            } => write!(f, "PartitionReconfigurePriority({member_id}, {partition_id}, priority={priority})"),
            TopologyChangeOperation::PartitionOverwriteConfiguration {
                member_id,
                partition_id,
                new_members,
            } => {
                let members: Vec<&str> = new_members.iter().map(MemberId::as_str).collect();
                write!(
                    f,
                    "PartitionOverwriteConfiguration({member_id}, {partition_id}, [{}])",
                    members.join(", ")
                )
            }
            TopologyChangeOperation::ForcePartitionReconfigure {
                member_id,
                partition_id,
                bootstrap,
            } => write!(f, "ForcePartitionReconfigure({member_id}, {partition_id}, bootstrap={bootstrap})"),
        }
    }
}
