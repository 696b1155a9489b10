use std::future::Future;

use ygg_topology::ClusterTopology;
use ygg_types::TopologyError;

/// Durable home of the cluster topology.
///
/// Methods use RPITIT (`-> impl Future + Send`) so generic coordinators can
/// `.await` them across threads without an `async-trait` dependency.
pub trait TopologyStore: Send + Sync + 'static {
    /// Return the stored topology, or an uninitialized one if nothing was
    /// stored yet.
    fn get_topology(&self) -> impl Future<Output = Result<ClusterTopology, TopologyError>> + Send;

    /// Atomically replace the stored topology with `f(current)`.
    ///
    /// No other update interleaves between reading `current` and storing the
    /// result. If `f` fails the store is left untouched and its error is
    /// returned. Resolves with the topology that was stored.
    fn update_topology<F>(
        &self,
        f: F,
    ) -> impl Future<Output = Result<ClusterTopology, TopologyError>> + Send
    where
        F: FnOnce(&ClusterTopology) -> Result<ClusterTopology, TopologyError> + Send + 'static;
}
