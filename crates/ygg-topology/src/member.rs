use std::collections::BTreeMap;

use ygg_types::{PartitionId, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MemberStatus {
    Joining,
    Active,
    Leaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PartitionStatus {
    Joining,
    Active,
    Leaving,
}

/// One replica of a partition hosted by a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartitionState {
    pub status: PartitionStatus,
    pub priority: Priority,
}

impl PartitionState {
    pub fn active(priority: Priority) -> Self {
        PartitionState { status: PartitionStatus::Active, priority }
    }

    pub fn joining(priority: Priority) -> Self {
        PartitionState { status: PartitionStatus::Joining, priority }
    }
}

/// State of a single member. Every transition returns a new value with a
/// bumped `version`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemberState {
    pub version: u64,
    pub status: MemberStatus,
    pub partitions: BTreeMap<PartitionId, PartitionState>,
}

impl MemberState {
    pub fn active(partitions: BTreeMap<PartitionId, PartitionState>) -> Self {
        MemberState { version: 0, status: MemberStatus::Active, partitions }
    }

    pub fn joining() -> Self {
        MemberState { version: 0, status: MemberStatus::Joining, partitions: BTreeMap::new() }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn has_partition(&self, partition_id: PartitionId) -> bool {
        self.partitions.contains_key(&partition_id)
    }

    pub fn partition(&self, partition_id: PartitionId) -> Option<&PartitionState> {
        self.partitions.get(&partition_id)
    }

    pub fn with_status(self, status: MemberStatus) -> Self {
        MemberState { version: self.version + 1, status, ..self }
    }

    pub fn with_partition(mut self, partition_id: PartitionId, state: PartitionState) -> Self {
        self.partitions.insert(partition_id, state);
        self.version += 1;
        self
    }

    /// Applies `f` to an existing replica. Unknown partitions are left alone.
    pub fn update_partition(
        mut self,
        partition_id: PartitionId,
        f: impl FnOnce(PartitionState) -> PartitionState,
    ) -> Self {
        if let Some(state) = self.partitions.remove(&partition_id) {
            self.partitions.insert(partition_id, f(state));
            self.version += 1;
        }
        self
    }

    pub fn without_partition(mut self, partition_id: PartitionId) -> Self {
        if self.partitions.remove(&partition_id).is_some() {
            self.version += 1;
        }
        self
    }
}
