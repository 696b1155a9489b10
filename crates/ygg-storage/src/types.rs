use ygg_topology::ClusterTopology;

/// Current on-disk layout of [`PersistedTopology`].
pub const FORMAT_VERSION: u32 = 1;

/// Envelope written to disk around the topology, so the layout can evolve
/// without misreading older files.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PersistedTopology {
    pub format_version: u32,
    pub topology: ClusterTopology,
}

impl PersistedTopology {
    pub fn new(topology: ClusterTopology) -> Self {
        PersistedTopology { format_version: FORMAT_VERSION, topology }
    }
}
