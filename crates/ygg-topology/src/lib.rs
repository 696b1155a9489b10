pub mod distribution;
pub mod member;
pub mod operation;
pub mod plan;
pub mod topology;
pub mod transform;
pub mod update;

pub use member::{MemberState, MemberStatus, PartitionState, PartitionStatus};
pub use operation::TopologyChangeOperation;
pub use plan::{ChangeStatus, ClusterChangePlan, CompletedChange};
pub use topology::ClusterTopology;
pub use transform::TopologyChangeRequest;
pub use update::StateUpdate;
