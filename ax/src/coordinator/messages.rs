//! Coordinator mailbox vocabulary
//!
//! Everything the coordinator reacts to arrives as a `CoordRequest`:
//! external requests from the placement UI, and tagged completions posted
//! back by the forwarder tasks that watch collaborator channels. The tag
//! is a monotonic token; completions whose token no longer matches the
//! outstanding request are discarded.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use anchorstore::AnchorStore;

use crate::platform::{AnchorBatch, CodecError, ExportStatus};
use crate::room::{Room, RoomError};

use super::state::AnchorState;

/// Observable boolean side effects of the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusFlags {
    /// Transport to the sharing session is up
    pub session_connected: bool,
    /// The sharing manager handshake completed
    pub manager_connected: bool,
    /// An anchor is adopted and authoritative
    pub anchor_configured: bool,
    /// The current anchor is located in the physical world
    pub anchor_located: bool,
    /// The current anchor was minted locally (vs adopted from a peer)
    pub local_anchor: bool,
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: AnchorState,
    pub flags: StatusFlags,
    pub room: Option<Room>,
    /// Human-readable line describing the last significant step
    #[serde(rename = "status-line")]
    pub status_line: String,
}

/// A state transition, broadcast to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: AnchorState,
    pub to: AnchorState,
}

/// Requests and completions consumed by the coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    // === External requests (placement UI / control surface) ===
    /// Begin a placement; accepted only while placement is allowed
    PlacementStart,
    /// Finish the placement in progress
    PlacementDone,
    /// Snapshot current state and flags
    GetStatus { reply: oneshot::Sender<StatusSnapshot> },
    /// Stop the coordinator task
    Shutdown,

    // === Collaborator completions (internal producers) ===
    /// The platform anchor store became available (fires once)
    StoreReady { store: Arc<AnchorStore> },
    /// A one-shot locate registration resolved
    LocateResolved { token: u64, located: bool },
    /// An accepted download finished
    DownloadCompleted {
        token: u64,
        result: Result<Vec<u8>, RoomError>,
    },
    /// An upload finished
    UploadCompleted { token: u64, result: Result<(), RoomError> },
    /// The serializer produced a payload fragment
    ExportChunk { token: u64, bytes: Vec<u8> },
    /// The serializer finished
    ExportCompleted { token: u64, status: ExportStatus },
    /// The deserializer finished
    ImportCompleted {
        token: u64,
        result: Result<AnchorBatch, CodecError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_all_false() {
        let flags = StatusFlags::default();
        assert!(!flags.session_connected);
        assert!(!flags.manager_connected);
        assert!(!flags.anchor_configured);
        assert!(!flags.anchor_located);
        assert!(!flags.local_anchor);
    }

    #[test]
    fn test_snapshot_serializes_kebab_case() {
        let snapshot = StatusSnapshot {
            state: AnchorState::Ready,
            flags: StatusFlags {
                anchor_configured: true,
                ..Default::default()
            },
            room: Some(Room {
                id: 74656,
                name: "ShareRoom".to_string(),
            }),
            status_line: "ready".to_string(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("anchor-configured"));
        assert!(json.contains("status-line"));
        assert!(json.contains("Ready"));
    }
}
