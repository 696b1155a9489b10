use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use ygg_topology::ClusterTopology;
use ygg_types::TopologyError;

use crate::traits::TopologyStore;
use crate::types::{PersistedTopology, FORMAT_VERSION};

const TOPOLOGY_KEY: &[u8] = b"topology";

fn encode<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, TopologyError> {
    bincode::serde::encode_to_vec(val, bincode::config::standard())
        .map_err(|e| TopologyError::internal(e.to_string()))
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, TopologyError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| TopologyError::internal(e.to_string()))
}

fn fjall_err(e: fjall::Error) -> TopologyError {
    TopologyError::internal(format!("storage: {e}"))
}

struct FjallHandle {
    db: fjall::Database,
    /// Single entry: `"topology"` → bincode(PersistedTopology)
    meta: fjall::Keyspace,
}

impl FjallHandle {
    fn read(&self) -> Result<ClusterTopology, TopologyError> {
        let Some(bytes) = self.meta.get(TOPOLOGY_KEY).map_err(fjall_err)? else {
            return Ok(ClusterTopology::uninitialized());
        };
        let persisted: PersistedTopology = decode(&bytes)?;
        if persisted.format_version != FORMAT_VERSION {
            return Err(TopologyError::internal(format!(
                "unsupported topology format version {}",
                persisted.format_version
            )));
        }
        Ok(persisted.topology)
    }

    fn write(&self, topology: &ClusterTopology) -> Result<(), TopologyError> {
        let bytes = encode(&PersistedTopology::new(topology.clone()))?;
        let mut batch = self.db.batch();
        batch.insert(&self.meta, TOPOLOGY_KEY, bytes);
        batch.commit().map_err(fjall_err)
    }
}

/// `TopologyStore` backed by fjall.
///
/// All blocking I/O is wrapped in `tokio::task::spawn_blocking`. Updates are
/// serialized by an async mutex held across the read, `f` and the write.
pub struct FjallTopologyStore {
    handle: Arc<FjallHandle>,
    write_lock: Mutex<()>,
}

impl FjallTopologyStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: &Path) -> Result<Self, TopologyError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let meta =
            db.keyspace("meta", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        Ok(FjallTopologyStore {
            handle: Arc::new(FjallHandle { db, meta }),
            write_lock: Mutex::new(()),
        })
    }

    async fn read(&self) -> Result<ClusterTopology, TopologyError> {
        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || handle.read())
            .await
            .map_err(|e| TopologyError::internal(e.to_string()))?
    }
}

impl TopologyStore for FjallTopologyStore {
    async fn get_topology(&self) -> Result<ClusterTopology, TopologyError> {
        self.read().await
    }

    async fn update_topology<F>(&self, f: F) -> Result<ClusterTopology, TopologyError>
    where
        F: FnOnce(&ClusterTopology) -> Result<ClusterTopology, TopologyError> + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let current = self.read().await?;
        let updated = f(&current)?;

        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || -> Result<ClusterTopology, TopologyError> {
            handle.write(&updated)?;
            Ok(updated)
        })
        .await
        .map_err(|e| TopologyError::internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use ygg_topology::TopologyChangeOperation;
    use ygg_types::MemberId;

    use super::*;

    fn open_store(dir: &Path) -> FjallTopologyStore {
        FjallTopologyStore::open(dir).expect("open store")
    }

    fn topology() -> ClusterTopology {
        ClusterTopology::bootstrap(
            [MemberId::from("1"), MemberId::from("2"), MemberId::from("3")],
            3,
            2,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_store_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store.get_topology().await.unwrap().is_uninitialized());
    }

    #[tokio::test]
    async fn update_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let stored = store.update_topology(|_| Ok(topology())).await.unwrap();
        assert_eq!(stored, topology());
        assert_eq!(store.get_topology().await.unwrap(), topology());

        let err = store
            .update_topology(|t| t.clone().start_topology_change(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidRequest(_)));
        assert_eq!(store.get_topology().await.unwrap(), topology());
    }

    #[tokio::test]
    async fn keeps_pending_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.update_topology(|_| Ok(topology())).await.unwrap();
        let expected = store
            .update_topology(|t| {
                t.clone().start_topology_change(vec![TopologyChangeOperation::member_join("4")])
            })
            .await
            .unwrap();

        let stored = store.get_topology().await.unwrap();
        assert_eq!(stored, expected);
        assert_eq!(
            stored.next_pending_operation(),
            Some(&TopologyChangeOperation::member_join("4"))
        );
    }

    #[tokio::test]
    async fn rejects_unknown_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let bytes = encode(&PersistedTopology { format_version: 99, topology: topology() }).unwrap();
        store.handle.meta.insert(TOPOLOGY_KEY, bytes).unwrap();

        let err = store.get_topology().await.unwrap_err();
        assert!(matches!(err, TopologyError::Internal(_)));
    }
}
