pub mod appliers;
pub mod coordinator;
pub mod driver;
pub mod executor;

pub use appliers::{ApplierSettings, OperationApplier, TopologyChangeAppliers};
pub use coordinator::{TopologyChangeCoordinator, TopologyChangeResult};
pub use driver::TopologyChangeDriver;
pub use executor::{
    MembershipChangeExecutor, NoopMembershipChangeExecutor, NoopPartitionChangeExecutor,
    PartitionChangeExecutor,
};
