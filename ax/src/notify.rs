//! Anchor announcement channel
//!
//! Best-effort broadcast telling peers "a new anchor named X is
//! available". Delivery is fire-and-forget; a dropped announcement is
//! recovered by the room's own anchor-list change event.

use tokio::sync::broadcast;

/// An inbound "new anchor available" announcement
#[derive(Debug, Clone)]
pub struct AnchorAnnouncement {
    /// Session ID of the announcing participant
    pub from: i64,
    /// Minted anchor name
    pub name: String,
}

/// Best-effort peer announcement channel
pub trait NotificationChannel: Send + Sync {
    /// Announce a newly uploaded anchor to all peers
    fn announce(&self, name: &str);

    /// Subscribe to inbound announcements (the local participant's own
    /// announcements are included; consumers filter by `from`)
    fn subscribe(&self) -> broadcast::Receiver<AnchorAnnouncement>;
}
