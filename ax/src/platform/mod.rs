//! Platform tracking and serialization interfaces
//!
//! The platform owns the physical-world side of an anchor: whether a live
//! anchor is located, how one is (de)serialized to opaque bytes, and the
//! durable store readiness signal. Everything asynchronous is delivered
//! through channels the coordinator consumes from its own loop; tracking
//! resolutions are one-shot by construction, so a registration can never
//! fire twice or dangle.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use anchorstore::{AnchorStore, StoreError};

/// Opaque handle to a live platform anchor attached to a target object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorHandle {
    id: u64,
    target: String,
}

impl AnchorHandle {
    /// Construct a handle; providers mint the ID
    pub fn new(id: u64, target: impl Into<String>) -> Self {
        Self {
            id,
            target: target.into(),
        }
    }

    /// Provider-minted anchor ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the object the anchor is attached to
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Result of importing a serialized anchor payload
///
/// The batch reports the IDs embedded in the payload by the exporter.
/// Adopters key their cache by the name they requested, not by these IDs.
#[derive(Debug, Clone)]
pub struct AnchorBatch {
    /// IDs the exporting side embedded in the payload
    pub ids: Vec<String>,
}

/// Terminal status of an export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Succeeded,
    Failed(String),
}

/// An in-flight anchor serialization
///
/// `chunks` yields payload fragments in arrival order and closes before
/// `completed` resolves with the terminal status, exactly once.
pub struct ExportJob {
    pub chunks: mpsc::Receiver<Vec<u8>>,
    pub completed: oneshot::Receiver<ExportStatus>,
}

/// Errors from tracking operations
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    #[error("failed to adopt cached anchor {0}")]
    AdoptFailed(String),

    #[error("failed to attach imported anchor: {0}")]
    AttachFailed(String),
}

/// Errors from the serialization codec
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("malformed anchor payload: {0}")]
    Malformed(String),

    #[error("deserialization failed: {0}")]
    Import(String),
}

/// Live-anchor tracking on the local device
pub trait TrackingProvider: Send + Sync {
    /// Whether this platform can mint fresh live anchors (some clients
    /// can only adopt)
    fn supports_anchor_creation(&self) -> bool;

    /// Return the live anchor attached to the target, creating one if
    /// none exists
    fn ensure_anchor(&self, target: &str) -> AnchorHandle;

    /// Recreate a live anchor on the target from a cached payload
    fn adopt_cached(&self, name: &str, payload: &[u8], target: &str) -> Result<AnchorHandle, TrackingError>;

    /// Lock an imported batch's anchor onto the target
    fn attach_batch(&self, batch: &AnchorBatch, target: &str) -> Result<AnchorHandle, TrackingError>;

    /// Whether the anchor is currently located in the physical world
    fn is_located(&self, anchor: &AnchorHandle) -> bool;

    /// Register for exactly one located/not-located resolution; the
    /// registration self-consumes when it fires
    fn locate_once(&self, anchor: &AnchorHandle) -> oneshot::Receiver<bool>;

    /// Destroy every live anchor attached to the target
    fn destroy_anchors(&self, target: &str);
}

/// Async anchor (de)serialization
pub trait AnchorCodec: Send + Sync {
    /// Serialize a live anchor under the given name
    fn export(&self, name: &str, anchor: &AnchorHandle) -> ExportJob;

    /// Deserialize a downloaded payload; resolves exactly once
    fn import(&self, payload: Vec<u8>) -> oneshot::Receiver<Result<AnchorBatch, CodecError>>;
}

/// Async acquisition of the durable anchor store
///
/// The platform signals store readiness exactly once; until then the
/// coordinator waits in its initial state.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<AnchorStore>, StoreError>;
}

/// Store provider backed by a database file on disk
pub struct DiskStoreProvider {
    path: std::path::PathBuf,
}

impl DiskStoreProvider {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StoreProvider for DiskStoreProvider {
    async fn acquire(&self) -> Result<Arc<AnchorStore>, StoreError> {
        let path = self.path.clone();
        let store = tokio::task::spawn_blocking(move || AnchorStore::open(path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        Ok(Arc::new(store))
    }
}

/// Store provider yielding an ephemeral in-memory store (tests, loopback)
pub struct MemoryStoreProvider;

#[async_trait]
impl StoreProvider for MemoryStoreProvider {
    async fn acquire(&self) -> Result<Arc<AnchorStore>, StoreError> {
        Ok(Arc::new(AnchorStore::open_in_memory()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_provider_acquires() {
        let provider = MemoryStoreProvider;
        let store = provider.acquire().await.unwrap();
        store.save("a", b"1").unwrap();
        assert!(store.contains("a").unwrap());
    }

    #[tokio::test]
    async fn test_disk_store_provider_acquires() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = DiskStoreProvider::new(dir.path().join("anchors.db"));
        let store = provider.acquire().await.unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_anchor_handle_accessors() {
        let handle = AnchorHandle::new(9, "placement");
        assert_eq!(handle.id(), 9);
        assert_eq!(handle.target(), "placement");
    }
}
