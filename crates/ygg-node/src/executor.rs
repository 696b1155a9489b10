use std::collections::BTreeMap;

use ygg_coordinator::{MembershipChangeExecutor, PartitionChangeExecutor};
use ygg_types::{MemberId, PartitionId, Priority, TopologyError};

/// Logs every partition change instead of moving data. Stands in until the
/// replication layer is wired in.
pub struct TracingPartitionExecutor {
    pub local_member: MemberId,
}

impl PartitionChangeExecutor for TracingPartitionExecutor {
    async fn join(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        priorities: &BTreeMap<MemberId, Priority>,
    ) -> Result<(), TopologyError> {
        tracing::info!(
            local = %self.local_member,
            member = %member_id,
            partition_id,
            replicas = ?priorities,
            "join partition"
        );
        Ok(())
    }

    async fn leave(&self, member_id: &MemberId, partition_id: PartitionId) -> Result<(), TopologyError> {
        tracing::info!(local = %self.local_member, member = %member_id, partition_id, "leave partition");
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        priority: Priority,
    ) -> Result<(), TopologyError> {
        tracing::info!(
            local = %self.local_member,
            member = %member_id,
            partition_id,
            priority,
            "reconfigure partition priority"
        );
        Ok(())
    }

    async fn force_reconfigure(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        members: &[MemberId],
        bootstrap: bool,
    ) -> Result<(), TopologyError> {
        tracing::warn!(
            local = %self.local_member,
            member = %member_id,
            partition_id,
            ?members,
            bootstrap,
            "force partition reconfiguration"
        );
        Ok(())
    }

    async fn overwrite_configuration(
        &self,
        member_id: &MemberId,
        partition_id: PartitionId,
        replicas: &BTreeMap<MemberId, Priority>,
    ) -> Result<(), TopologyError> {
        tracing::warn!(
            local = %self.local_member,
            member = %member_id,
            partition_id,
            ?replicas,
            "overwrite partition configuration"
        );
        Ok(())
    }
}

pub struct TracingMembershipExecutor;

impl MembershipChangeExecutor for TracingMembershipExecutor {
    async fn add_member(&self, member_id: &MemberId) -> Result<(), TopologyError> {
        tracing::info!(member = %member_id, "add member");
        Ok(())
    }

    async fn remove_member(&self, member_id: &MemberId) -> Result<(), TopologyError> {
        tracing::info!(member = %member_id, "remove member");
        Ok(())
    }
}
