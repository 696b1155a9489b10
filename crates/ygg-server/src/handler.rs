use std::sync::Arc;

use ygg_coordinator::TopologyChangeCoordinator;
use ygg_storage::TopologyStore;
use ygg_topology::transform::{
    AddMembersTransformer, PartitionReassignTransformer, RemoveMembersTransformer,
    ScaleTransformer,
};
use ygg_topology::{ClusterTopology, TopologyChangeOperation, TopologyChangeRequest};
use ygg_types::TopologyError;

use crate::convert::{change_response, require_members};
use crate::request::{TopologyManagementRequest, TopologyManagementResponse};

/// Turns management requests into coordinator calls.
///
/// Transformers plan with the coordinator's replication factor, the same one
/// its appliers enforce.
pub struct TopologyManagementRequestsHandler<S> {
    coordinator: Arc<TopologyChangeCoordinator<S>>,
}

impl<S: TopologyStore> TopologyManagementRequestsHandler<S> {
    pub fn new(coordinator: Arc<TopologyChangeCoordinator<S>>) -> Self {
        TopologyManagementRequestsHandler { coordinator }
    }

    pub async fn handle(
        &self,
        request: TopologyManagementRequest,
    ) -> Result<TopologyManagementResponse, TopologyError> {
        let rf = self.coordinator.settings().replication_factor;
        match request {
            TopologyManagementRequest::AddMembers { members, dry_run } => {
                require_members(&members)?;
                self.change(dry_run, &AddMembersTransformer::new(members, rf)).await
            }
            TopologyManagementRequest::RemoveMembers { members, dry_run } => {
                require_members(&members)?;
                self.change(dry_run, &RemoveMembersTransformer::new(members, rf)).await
            }
            TopologyManagementRequest::JoinPartition {
                member_id,
                partition_id,
                priority,
                dry_run,
            } => {
                let join = move |_: &ClusterTopology| -> Result<Vec<TopologyChangeOperation>, TopologyError> {
                    Ok(vec![TopologyChangeOperation::partition_join(
                        member_id.clone(),
                        partition_id,
                        priority,
                    )])
                };
                self.change(dry_run, &join).await
            }
            TopologyManagementRequest::LeavePartition { member_id, partition_id, dry_run } => {
                let leave = move |_: &ClusterTopology| -> Result<Vec<TopologyChangeOperation>, TopologyError> {
                    Ok(vec![TopologyChangeOperation::partition_leave(member_id.clone(), partition_id)])
                };
                self.change(dry_run, &leave).await
            }
            TopologyManagementRequest::ReassignPartitions { members, dry_run } => {
                require_members(&members)?;
                self.change(dry_run, &PartitionReassignTransformer::new(members, rf)).await
            }
            TopologyManagementRequest::Scale { members, dry_run } => {
                require_members(&members)?;
                self.change(dry_run, &ScaleTransformer::new(members, rf)).await
            }
            TopologyManagementRequest::CancelChange { change_id } => {
                let topology = self.coordinator.cancel_change(change_id).await.inspect_err(|e| {
                    tracing::warn!(change_id, error = %e, "cancel request failed");
                })?;
                Ok(TopologyManagementResponse::Topology(topology))
            }
            TopologyManagementRequest::ForceOverwriteTopology { members_to_remove } => {
                require_members(&members_to_remove)?;
                let result = self
                    .coordinator
                    .force_overwrite_topology(&members_to_remove)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(error = %e, "force overwrite request failed");
                    })?;
                Ok(TopologyManagementResponse::Change(change_response(result)))
            }
            TopologyManagementRequest::GetTopology => {
                Ok(TopologyManagementResponse::Topology(self.coordinator.get_topology().await?))
            }
        }
    }

    async fn change<R>(
        &self,
        dry_run: bool,
        request: &R,
    ) -> Result<TopologyManagementResponse, TopologyError>
    where
        R: TopologyChangeRequest + ?Sized,
    {
        let result = if dry_run {
            self.coordinator.simulate_operations(request).await
        } else {
            self.coordinator.apply_operations(request).await
        };
        let result = result.inspect_err(|e| {
            tracing::warn!(dry_run, error = %e, "topology change request failed");
        })?;
        Ok(TopologyManagementResponse::Change(change_response(result)))
    }
}

#[cfg(test)]
mod tests {
    use ygg_coordinator::ApplierSettings;
    use ygg_storage::MemTopologyStore;
    use ygg_types::MemberId;

    use super::*;
    use crate::request::TopologyChangeResponse;

    fn ids(raw: &[&str]) -> Vec<MemberId> {
        raw.iter().map(|s| MemberId::from(*s)).collect()
    }

    fn handler(topology: ClusterTopology) -> TopologyManagementRequestsHandler<MemTopologyStore> {
        let coordinator = TopologyChangeCoordinator::new(
            Arc::new(MemTopologyStore::new(topology)),
            ApplierSettings { replication_factor: 2, coordinator: None },
        );
        TopologyManagementRequestsHandler::new(Arc::new(coordinator))
    }

    fn change(response: TopologyManagementResponse) -> TopologyChangeResponse {
        match response {
            TopologyManagementResponse::Change(change) => change,
            other => panic!("expected a change response, got {other:?}"),
        }
    }

    fn topology(response: TopologyManagementResponse) -> ClusterTopology {
        match response {
            TopologyManagementResponse::Topology(topology) => topology,
            other => panic!("expected a topology, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_topology() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2"]), 2, 2).unwrap();
        let h = handler(t.clone());
        let got = topology(h.handle(TopologyManagementRequest::GetTopology).await.unwrap());
        assert_eq!(got, t);
    }

    #[tokio::test]
    async fn add_members_dry_run() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2"]), 2, 2).unwrap();
        let h = handler(t.clone());

        let response = change(
            h.handle(TopologyManagementRequest::AddMembers { members: ids(&["3"]), dry_run: true })
                .await
                .unwrap(),
        );
        assert_eq!(response.change_id, 0);
        assert_eq!(response.operations, vec![TopologyChangeOperation::member_join("3")]);
        assert_eq!(&response.current_members, t.members());
        assert!(response.expected_members.contains_key(&MemberId::from("3")));

        let got = topology(h.handle(TopologyManagementRequest::GetTopology).await.unwrap());
        assert_eq!(got, t);
    }

    #[tokio::test]
    async fn join_then_cancel() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2", "3"]), 3, 1).unwrap();
        let h = handler(t);

        let response = change(
            h.handle(TopologyManagementRequest::JoinPartition {
                member_id: MemberId::from("2"),
                partition_id: 1,
                priority: 1,
                dry_run: false,
            })
            .await
            .unwrap(),
        );
        assert_eq!(response.change_id, 1);
        assert!(response.expected_members[&MemberId::from("2")].has_partition(1));

        let cancelled = topology(
            h.handle(TopologyManagementRequest::CancelChange { change_id: 1 }).await.unwrap(),
        );
        assert!(!cancelled.has_pending_changes());
        assert!(!cancelled.member(&MemberId::from("2")).unwrap().has_partition(1));
    }

    #[tokio::test]
    async fn leaving_the_last_replica_is_rejected() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2"]), 2, 1).unwrap();
        let h = handler(t);
        let err = h
            .handle(TopologyManagementRequest::LeavePartition {
                member_id: MemberId::from("1"),
                partition_id: 1,
                dry_run: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn leaving_below_the_replication_factor_is_rejected() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2"]), 2, 2).unwrap();
        let h = handler(t.clone());
        for dry_run in [true, false] {
            let err = h
                .handle(TopologyManagementRequest::LeavePartition {
                    member_id: MemberId::from("1"),
                    partition_id: 1,
                    dry_run,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, TopologyError::InvalidRequest(_)));
        }
        let got = topology(h.handle(TopologyManagementRequest::GetTopology).await.unwrap());
        assert_eq!(got, t);
    }

    #[tokio::test]
    async fn empty_member_lists_are_rejected() {
        let h = handler(ClusterTopology::bootstrap(ids(&["1", "2"]), 2, 2).unwrap());
        for request in [
            TopologyManagementRequest::AddMembers { members: Vec::new(), dry_run: true },
            TopologyManagementRequest::Scale { members: Vec::new(), dry_run: false },
            TopologyManagementRequest::ForceOverwriteTopology { members_to_remove: Vec::new() },
        ] {
            let err = h.handle(request).await.unwrap_err();
            assert!(matches!(err, TopologyError::InvalidRequest(_)));
        }
    }

    #[tokio::test]
    async fn force_overwrite_and_reassign() {
        let t = ClusterTopology::bootstrap(ids(&["1", "2", "3"]), 3, 2).unwrap();
        let h = handler(t);

        let response = change(
            h.handle(TopologyManagementRequest::ForceOverwriteTopology {
                members_to_remove: ids(&["3"]),
            })
            .await
            .unwrap(),
        );
        assert_eq!(response.change_id, 1);
        assert!(!response.expected_members.contains_key(&MemberId::from("3")));

        // The forced change is still pending, so nothing else may start.
        let err = h
            .handle(TopologyManagementRequest::ReassignPartitions {
                members: ids(&["1", "2"]),
                dry_run: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::ConcurrentModification(_)));
    }
}
