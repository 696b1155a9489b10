use std::sync::Arc;

use tokio::sync::RwLock;

use ygg_topology::ClusterTopology;
use ygg_types::TopologyError;

use crate::traits::TopologyStore;

/// In-memory `TopologyStore`.
///
/// Intended for tests and single-process tools; not persisted across restarts.
/// Clones share the same topology.
#[derive(Clone)]
pub struct MemTopologyStore {
    inner: Arc<RwLock<ClusterTopology>>,
}

impl MemTopologyStore {
    pub fn new(topology: ClusterTopology) -> Self {
        MemTopologyStore { inner: Arc::new(RwLock::new(topology)) }
    }
}

impl Default for MemTopologyStore {
    fn default() -> Self {
        Self::new(ClusterTopology::uninitialized())
    }
}

impl TopologyStore for MemTopologyStore {
    async fn get_topology(&self) -> Result<ClusterTopology, TopologyError> {
        Ok(self.inner.read().await.clone())
    }

    async fn update_topology<F>(&self, f: F) -> Result<ClusterTopology, TopologyError>
    where
        F: FnOnce(&ClusterTopology) -> Result<ClusterTopology, TopologyError> + Send + 'static,
    {
        let mut g = self.inner.write().await;
        let updated = f(&*g)?;
        *g = updated.clone();
        Ok(updated)
    }
}
