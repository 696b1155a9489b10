use std::collections::BTreeMap;
use std::fmt;

use ygg_topology::{ClusterTopology, MemberState, TopologyChangeOperation};
use ygg_types::{MemberId, PartitionId, Priority};

use crate::convert::write_members;

/// Management requests accepted by a node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TopologyManagementRequest {
    AddMembers {
        members: Vec<MemberId>,
        dry_run: bool,
    },
    RemoveMembers {
        members: Vec<MemberId>,
        dry_run: bool,
    },
    JoinPartition {
        member_id: MemberId,
        partition_id: PartitionId,
        priority: Priority,
        dry_run: bool,
    },
    LeavePartition {
        member_id: MemberId,
        partition_id: PartitionId,
        dry_run: bool,
    },
    ReassignPartitions {
        members: Vec<MemberId>,
        dry_run: bool,
    },
    Scale {
        members: Vec<MemberId>,
        dry_run: bool,
    },
    CancelChange {
        change_id: u64,
    },
    ForceOverwriteTopology {
        members_to_remove: Vec<MemberId>,
    },
    GetTopology,
}

/// What a change request did, or would do on a dry run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TopologyChangeResponse {
    /// 0 when nothing was committed.
    pub change_id: u64,
    pub current_members: BTreeMap<MemberId, MemberState>,
    pub expected_members: BTreeMap<MemberId, MemberState>,
    pub operations: Vec<TopologyChangeOperation>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TopologyManagementResponse {
    Change(TopologyChangeResponse),
    Topology(ClusterTopology),
}

impl fmt::Display for TopologyChangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "change id: {}", self.change_id)?;
        writeln!(f, "operations:")?;
        for op in &self.operations {
            writeln!(f, "  {op}")?;
        }
        writeln!(f, "current members:")?;
        write_members(f, &self.current_members)?;
        writeln!(f, "expected members:")?;
        write_members(f, &self.expected_members)
    }
}

impl fmt::Display for TopologyManagementResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyManagementResponse::Change(change) => fmt::Display::fmt(change, f),
            TopologyManagementResponse::Topology(topology) => {
                if topology.is_uninitialized() {
                    return writeln!(f, "topology not initialized");
                }
                writeln!(f, "version: {}", topology.version())?;
                match topology.pending_changes() {
                    Some(plan) => writeln!(
                        f,
                        "pending change: {} ({} operations left)",
                        plan.id,
                        plan.pending_operations.len()
                    )?,
                    None => writeln!(f, "pending change: none")?,
                }
                if let Some(last) = topology.last_change() {
                    writeln!(f, "last change: {} ({:?})", last.id, last.status)?;
                }
                writeln!(f, "members:")?;
                write_members(f, topology.members())
            }
        }
    }
}
