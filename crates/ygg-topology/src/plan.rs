use std::collections::VecDeque;

use crate::operation::TopologyChangeOperation;

/// The ordered operations realizing one topology change.
///
/// Operations move from `pending_operations` to `completed_operations` one at
/// a time and are never reordered.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClusterChangePlan {
    pub id: u64,
    pub pending_operations: VecDeque<TopologyChangeOperation>,
    pub completed_operations: Vec<TopologyChangeOperation>,
}

impl ClusterChangePlan {
    pub fn new(id: u64, operations: Vec<TopologyChangeOperation>) -> Self {
        ClusterChangePlan {
            id,
            pending_operations: operations.into(),
            completed_operations: Vec::new(),
        }
    }

    pub fn has_pending_operations(&self) -> bool {
        !self.pending_operations.is_empty()
    }

    pub fn next_operation(&self) -> Option<&TopologyChangeOperation> {
        self.pending_operations.front()
    }

    /// Moves the head pending operation to the completed list.
    pub(crate) fn advance(mut self) -> Self {
        if let Some(op) = self.pending_operations.pop_front() {
            self.completed_operations.push(op);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ChangeStatus {
    Completed,
    Cancelled,
}

/// Record of the last change that left the pending state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompletedChange {
    pub id: u64,
    pub status: ChangeStatus,
    /// Only the operations that were actually applied.
    pub operations: Vec<TopologyChangeOperation>,
    pub completed_at_ns: i64,
}
