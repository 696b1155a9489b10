pub mod fjall;
pub mod mem;
pub mod traits;
pub mod types;

pub use fjall::FjallTopologyStore;
pub use mem::MemTopologyStore;
pub use traits::TopologyStore;
pub use types::PersistedTopology;
