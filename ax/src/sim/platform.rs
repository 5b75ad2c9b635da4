//! Simulated tracking and serialization
//!
//! Stands in for the device's spatial-tracking runtime: live anchors are
//! rows in a table, payloads are a parseable synthetic format, and locate
//! resolutions are delivered through the same one-shot channels a real
//! provider would use. Knobs control payload size, chunking, locate
//! outcomes, and injected failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::platform::{AnchorBatch, AnchorCodec, AnchorHandle, CodecError, ExportJob, ExportStatus, TrackingError, TrackingProvider};

const PAYLOAD_MAGIC: &[u8; 4] = b"AXBL";

/// Encode a synthetic anchor payload embedding the anchor name
///
/// Layout: 4-byte magic, u16 big-endian name length, name bytes, random
/// filler up to `total_len`.
pub fn encode_payload(name: &str, total_len: usize) -> Vec<u8> {
    let header_len = PAYLOAD_MAGIC.len() + 2 + name.len();
    let total = total_len.max(header_len);

    let mut payload = Vec::with_capacity(total);
    payload.extend_from_slice(PAYLOAD_MAGIC);
    payload.extend_from_slice(&(name.len() as u16).to_be_bytes());
    payload.extend_from_slice(name.as_bytes());

    let mut filler = vec![0u8; total - header_len];
    rand::rng().fill(&mut filler[..]);
    payload.extend_from_slice(&filler);
    payload
}

/// Decode a synthetic payload back to the embedded anchor name
pub fn decode_payload(payload: &[u8]) -> Result<String, CodecError> {
    if payload.len() < PAYLOAD_MAGIC.len() + 2 || &payload[..4] != PAYLOAD_MAGIC {
        return Err(CodecError::Malformed("missing payload magic".to_string()));
    }

    let name_len = u16::from_be_bytes([payload[4], payload[5]]) as usize;
    let name_end = 6 + name_len;
    if payload.len() < name_end {
        return Err(CodecError::Malformed("truncated name field".to_string()));
    }

    String::from_utf8(payload[6..name_end].to_vec())
        .map_err(|_| CodecError::Malformed("name is not UTF-8".to_string()))
}

struct SimAnchor {
    target: String,
    located: bool,
}

struct PlatformState {
    next_id: u64,
    anchors: HashMap<u64, SimAnchor>,
    pending_locates: Vec<(u64, oneshot::Sender<bool>)>,
    supports_creation: bool,
    located_on_create: bool,
    located_on_adopt: bool,
    export_payload_len: usize,
    export_chunk_len: usize,
    fail_next_export: bool,
    fail_next_import: bool,
}

/// Simulated device tracking runtime + codec
pub struct SimPlatform {
    state: Mutex<PlatformState>,
}

impl SimPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PlatformState {
                next_id: 1,
                anchors: HashMap::new(),
                pending_locates: Vec::new(),
                supports_creation: true,
                located_on_create: true,
                located_on_adopt: true,
                export_payload_len: 120_000,
                export_chunk_len: 32_768,
                fail_next_export: false,
                fail_next_import: false,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether this platform mints live anchors at all
    pub fn set_supports_creation(&self, supports: bool) {
        self.state().supports_creation = supports;
    }

    /// Whether freshly created anchors start located
    pub fn set_located_on_create(&self, located: bool) {
        self.state().located_on_create = located;
    }

    /// Whether anchors adopted from cache start located
    pub fn set_located_on_adopt(&self, located: bool) {
        self.state().located_on_adopt = located;
    }

    /// Size of payloads produced by export
    pub fn set_export_payload_len(&self, len: usize) {
        self.state().export_payload_len = len;
    }

    /// Chunk size used when streaming export bytes
    pub fn set_export_chunk_len(&self, len: usize) {
        self.state().export_chunk_len = len.max(1);
    }

    /// Fail the next export with a partial chunk stream
    pub fn fail_next_export(&self) {
        self.state().fail_next_export = true;
    }

    /// Fail the next import
    pub fn fail_next_import(&self) {
        self.state().fail_next_import = true;
    }

    /// Number of locate registrations awaiting resolution
    pub fn pending_locate_count(&self) -> usize {
        self.state().pending_locates.len()
    }

    /// Resolve every pending locate registration with the given outcome,
    /// updating the anchors' located flags to match
    pub fn resolve_pending_locates(&self, located: bool) {
        let pending = {
            let mut state = self.state();
            let pending: Vec<_> = state.pending_locates.drain(..).collect();
            for (id, _) in &pending {
                if let Some(anchor) = state.anchors.get_mut(id) {
                    anchor.located = located;
                }
            }
            pending
        };

        for (id, tx) in pending {
            debug!(anchor_id = id, located, "SimPlatform::resolve_pending_locates");
            let _ = tx.send(located);
        }
    }
}

impl TrackingProvider for SimPlatform {
    fn supports_anchor_creation(&self) -> bool {
        self.state().supports_creation
    }

    fn ensure_anchor(&self, target: &str) -> AnchorHandle {
        let mut state = self.state();

        if let Some((&id, _)) = state.anchors.iter().find(|(_, a)| a.target == target) {
            return AnchorHandle::new(id, target);
        }

        let id = state.next_id;
        state.next_id += 1;
        let located = state.located_on_create;
        state.anchors.insert(
            id,
            SimAnchor {
                target: target.to_string(),
                located,
            },
        );
        debug!(anchor_id = id, target, located, "SimPlatform::ensure_anchor: created");
        AnchorHandle::new(id, target)
    }

    fn adopt_cached(&self, name: &str, payload: &[u8], target: &str) -> Result<AnchorHandle, TrackingError> {
        decode_payload(payload).map_err(|_| TrackingError::AdoptFailed(name.to_string()))?;

        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        let located = state.located_on_adopt;
        state.anchors.insert(
            id,
            SimAnchor {
                target: target.to_string(),
                located,
            },
        );
        debug!(anchor_id = id, name, target, located, "SimPlatform::adopt_cached");
        Ok(AnchorHandle::new(id, target))
    }

    fn attach_batch(&self, batch: &AnchorBatch, target: &str) -> Result<AnchorHandle, TrackingError> {
        let Some(first) = batch.ids.first() else {
            return Err(TrackingError::AttachFailed("batch carries no anchors".to_string()));
        };

        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.anchors.insert(
            id,
            SimAnchor {
                target: target.to_string(),
                located: true,
            },
        );
        debug!(anchor_id = id, batch_id = %first, target, "SimPlatform::attach_batch");
        Ok(AnchorHandle::new(id, target))
    }

    fn is_located(&self, anchor: &AnchorHandle) -> bool {
        self.state().anchors.get(&anchor.id()).map(|a| a.located).unwrap_or(false)
    }

    fn locate_once(&self, anchor: &AnchorHandle) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.state().pending_locates.push((anchor.id(), tx));
        rx
    }

    fn destroy_anchors(&self, target: &str) {
        let mut state = self.state();
        let doomed: Vec<u64> = state
            .anchors
            .iter()
            .filter(|(_, a)| a.target == target)
            .map(|(&id, _)| id)
            .collect();

        for id in &doomed {
            state.anchors.remove(id);
        }
        state.pending_locates.retain(|(id, _)| !doomed.contains(id));
        debug!(target, destroyed = doomed.len(), "SimPlatform::destroy_anchors");
    }
}

impl AnchorCodec for SimPlatform {
    fn export(&self, name: &str, _anchor: &AnchorHandle) -> ExportJob {
        let mut state = self.state();
        let payload = encode_payload(name, state.export_payload_len);
        let chunk_len = state.export_chunk_len;
        let failing = state.fail_next_export;
        state.fail_next_export = false;
        drop(state);

        let chunks: Vec<Vec<u8>> = payload.chunks(chunk_len).map(|c| c.to_vec()).collect();
        let (chunk_tx, chunk_rx) = mpsc::channel(chunks.len().max(1));
        let (done_tx, done_rx) = oneshot::channel();

        if failing {
            // A failed serialization still delivers partial bytes first
            if let Some(first) = chunks.into_iter().next() {
                let _ = chunk_tx.try_send(first);
            }
            let _ = done_tx.send(ExportStatus::Failed("injected export failure".to_string()));
        } else {
            for chunk in chunks {
                let _ = chunk_tx.try_send(chunk);
            }
            let _ = done_tx.send(ExportStatus::Succeeded);
        }
        drop(chunk_tx);

        ExportJob {
            chunks: chunk_rx,
            completed: done_rx,
        }
    }

    fn import(&self, payload: Vec<u8>) -> oneshot::Receiver<Result<AnchorBatch, CodecError>> {
        let (tx, rx) = oneshot::channel();

        let failing = {
            let mut state = self.state();
            let failing = state.fail_next_import;
            state.fail_next_import = false;
            failing
        };

        if failing {
            let _ = tx.send(Err(CodecError::Import("injected import failure".to_string())));
        } else {
            let result = decode_payload(&payload).map(|name| AnchorBatch { ids: vec![name] });
            let _ = tx.send(result);
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let payload = encode_payload("anchor-123", 4096);
        assert_eq!(payload.len(), 4096);
        assert_eq!(decode_payload(&payload).unwrap(), "anchor-123");
    }

    #[test]
    fn test_payload_never_truncates_name() {
        let name = "a".repeat(64);
        let payload = encode_payload(&name, 10);
        assert_eq!(decode_payload(&payload).unwrap(), name);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payload(b"nope").is_err());
        assert!(decode_payload(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_ensure_anchor_is_idempotent_per_target() {
        let platform = SimPlatform::new();
        let a = platform.ensure_anchor("placement");
        let b = platform.ensure_anchor("placement");
        assert_eq!(a, b);

        let c = platform.ensure_anchor("other");
        assert_ne!(a.id(), c.id());
    }

    #[tokio::test]
    async fn test_locate_once_resolution() {
        let platform = SimPlatform::new();
        platform.set_located_on_create(false);

        let anchor = platform.ensure_anchor("placement");
        assert!(!platform.is_located(&anchor));

        let rx = platform.locate_once(&anchor);
        assert_eq!(platform.pending_locate_count(), 1);

        platform.resolve_pending_locates(true);
        assert!(rx.await.unwrap());
        assert!(platform.is_located(&anchor));
    }

    #[tokio::test]
    async fn test_export_streams_all_chunks_then_succeeds() {
        let platform = SimPlatform::new();
        platform.set_export_payload_len(10_000);
        platform.set_export_chunk_len(1024);

        let anchor = platform.ensure_anchor("placement");
        let mut job = platform.export("anchor-x", &anchor);

        let mut collected = Vec::new();
        while let Some(chunk) = job.chunks.recv().await {
            collected.extend_from_slice(&chunk);
        }

        assert_eq!(job.completed.await.unwrap(), ExportStatus::Succeeded);
        assert_eq!(collected.len(), 10_000);
        assert_eq!(decode_payload(&collected).unwrap(), "anchor-x");
    }

    #[tokio::test]
    async fn test_failed_export_delivers_partial_bytes() {
        let platform = SimPlatform::new();
        platform.set_export_payload_len(10_000);
        platform.set_export_chunk_len(1024);
        platform.fail_next_export();

        let anchor = platform.ensure_anchor("placement");
        let mut job = platform.export("anchor-x", &anchor);

        let mut collected = Vec::new();
        while let Some(chunk) = job.chunks.recv().await {
            collected.extend_from_slice(&chunk);
        }

        assert!(matches!(job.completed.await.unwrap(), ExportStatus::Failed(_)));
        assert!(collected.len() < 10_000);
    }

    #[tokio::test]
    async fn test_import_reports_embedded_id() {
        let platform = SimPlatform::new();
        let payload = encode_payload("anchor-y", 256);

        let batch = platform.import(payload).await.unwrap().unwrap();
        assert_eq!(batch.ids, vec!["anchor-y".to_string()]);
    }

    #[tokio::test]
    async fn test_destroy_anchors_clears_target() {
        let platform = SimPlatform::new();
        let anchor = platform.ensure_anchor("placement");
        platform.ensure_anchor("other");

        platform.destroy_anchors("placement");
        assert!(!platform.is_located(&anchor));

        // A fresh ensure mints a new anchor
        let again = platform.ensure_anchor("placement");
        assert_ne!(anchor.id(), again.id());
    }
}
