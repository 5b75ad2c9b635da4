//! Session membership interface
//!
//! Reports the local participant's identity, the ordered set of joined
//! peers (the leader-election input), and connection lifecycle events.

use tokio::sync::broadcast;

/// Session lifecycle events delivered to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The sharing manager finished its handshake
    ManagerConnected,
    /// Transport to the sharing server established
    ServerConnected,
    /// Transport to the sharing server lost
    ServerDisconnected,
    /// The local participant joined the session
    Joined,
    /// The local participant left the session
    Left,
}

/// Membership in the shared session
pub trait SessionMembership: Send + Sync {
    /// Stable session ID of the local participant
    fn local_id(&self) -> i64;

    /// Ordered IDs of all currently joined participants (includes the
    /// local ID)
    fn peer_ids(&self) -> Vec<i64>;

    /// Subscribe to session lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
