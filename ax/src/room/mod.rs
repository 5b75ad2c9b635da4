//! Shared-room service interface
//!
//! A room is a named, ID'd container associating a set of uploaded anchor
//! payloads with a session of peers. The coordinator looks a room up by
//! case-insensitive name, creates it when elected, and transfers anchor
//! blobs through it. Transfers are ticketed: the request either gets a
//! ticket (a one-shot receiver for the async completion) or is rejected
//! outright.

mod election;

pub use election::should_create_room;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

/// Handle to a shared room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    /// Stable numeric room ID
    pub id: i64,
    /// Display name, matched case-insensitively on lookup
    pub name: String,
}

/// Events broadcast by the room service
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The anchor slot list of a room changed (upload or eviction)
    AnchorsChanged { room_id: i64 },
}

/// Errors from room operations
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("not joined to room {0}")]
    NotJoined(i64),

    #[error("room service unavailable")]
    Unavailable,
}

/// One-shot receiver for an accepted transfer's async completion
pub type TransferTicket<T> = oneshot::Receiver<Result<T, RoomError>>;

/// Room membership, anchor slots, and blob transfer
///
/// Synchronous methods reflect the service's current view; transfers
/// complete asynchronously through their ticket.
pub trait RoomService: Send + Sync {
    /// The room this participant currently holds, if any
    fn current_room(&self) -> Option<Room>;

    /// Number of rooms visible to this participant
    fn room_count(&self) -> usize;

    /// Room handle at the given index
    fn room_at(&self, index: usize) -> Option<Room>;

    /// Create a room and join it as its first member
    fn create_room(&self, name: &str, id: i64, keep_alive: bool) -> Result<Room, RoomError>;

    /// Join an existing room by ID
    fn join_room(&self, room_id: i64) -> Result<Room, RoomError>;

    /// Number of anchor slots in a room
    fn anchor_count(&self, room_id: i64) -> usize;

    /// Anchor name at the given slot index (slots are upload-ordered)
    fn anchor_name_at(&self, room_id: i64, index: usize) -> Option<String>;

    /// Request an anchor payload download; `Err` means the request was
    /// rejected and no completion will arrive
    fn download_anchor(&self, room_id: i64, name: &str) -> Result<TransferTicket<Vec<u8>>, RoomError>;

    /// Upload an anchor payload into a new slot
    fn upload_anchor(&self, room_id: i64, name: &str, payload: Vec<u8>) -> TransferTicket<()>;

    /// Subscribe to room change events
    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_equality_is_by_id_and_name() {
        let a = Room {
            id: 74656,
            name: "ShareRoom".to_string(),
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_room_error_display() {
        let err = RoomError::Rejected("no such anchor".to_string());
        assert_eq!(err.to_string(), "request rejected: no such anchor");

        let err = RoomError::NotJoined(7);
        assert!(err.to_string().contains('7'));
    }
}
