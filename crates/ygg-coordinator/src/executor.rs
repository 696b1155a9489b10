use std::collections::BTreeMap;
use std::future::Future;

use ygg_types::{MemberId, PartitionId, Priority, TopologyError};

/// Performs the side effects of partition operations on a member.
///
/// Every method resolves once the member confirmed the change. Failures are
/// reported as `TopologyError::Internal`.
pub trait PartitionChangeExecutor: Send + Sync + 'static {
    /// Start replicating `partition_id` on `member_id`. `priorities` is the
    /// full replica set including the joining member.
    fn join(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        priorities: &BTreeMap<MemberId, Priority>,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    fn leave(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    fn reconfigure_priority(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        priority: Priority,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    /// Make `members` the only replicas of `partition_id`. The bootstrap
    /// replica starts from its local state and the others follow it.
    fn force_reconfigure(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        members: &[MemberId],
        bootstrap: bool,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    fn overwrite_configuration(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        replicas: &BTreeMap<MemberId, Priority>,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;
}

/// Adds and removes members in the membership service.
pub trait MembershipChangeExecutor: Send + Sync + 'static {
    fn add_member(
        &self,
        member_id: &MemberId,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    fn remove_member(
        &self,
        member_id: &MemberId,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;
}

/// Resolves immediately. Used to simulate changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPartitionChangeExecutor;

impl PartitionChangeExecutor for NoopPartitionChangeExecutor {
    async fn join(
        &self,
        _member_id: &MemberId,
        _partition_id: PartitionId,
        _priorities: &BTreeMap<MemberId, Priority>,
    ) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn leave(&self, _member_id: &MemberId, _partition_id: PartitionId) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        _member_id: &MemberId,
        _partition_id: PartitionId,
        _priority: Priority,
    ) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn force_reconfigure(
        &self,
        _member_id: &MemberId,
        _partition_id: PartitionId,
        _members: &[MemberId],
        _bootstrap: bool,
    ) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn overwrite_configuration(
        &self,
        _member_id: &MemberId,
        _partition_id: PartitionId,
        _replicas: &BTreeMap<MemberId, Priority>,
    ) -> Result<(), TopologyError> {
        Ok(())
    }
}

/// Resolves immediately. Used to simulate changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMembershipChangeExecutor;

impl MembershipChangeExecutor for NoopMembershipChangeExecutor {
    async fn add_member(&self, _member_id: &MemberId) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn remove_member(&self, _member_id: &MemberId) -> Result<(), TopologyError> {
        Ok(())
    }
}
