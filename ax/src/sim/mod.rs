//! In-process loopback implementations of the collaborator services
//!
//! Backs tests and the `ax run` loopback soak: several coordinators share
//! one [`SharingHub`] and run the full synchronization protocol against
//! each other inside a single process.

mod hub;
mod platform;

pub use hub::{SharingHub, SimNotifications, SimRoomService, SimSession, TransferMode};
pub use platform::{SimPlatform, decode_payload, encode_payload};

use std::sync::Arc;

use crate::coordinator::Collaborators;
use crate::platform::StoreProvider;

/// One simulated participant's bundle of collaborator services
pub struct SimParticipant {
    pub rooms: Arc<SimRoomService>,
    pub session: Arc<SimSession>,
    pub notifications: Arc<SimNotifications>,
    pub platform: Arc<SimPlatform>,
}

impl SimParticipant {
    /// Wire a participant onto a hub under the given session ID
    pub fn new(hub: &Arc<SharingHub>, user_id: i64) -> Self {
        Self {
            rooms: SimRoomService::new(hub.clone(), user_id),
            session: SimSession::new(hub.clone(), user_id),
            notifications: SimNotifications::new(hub.clone(), user_id),
            platform: SimPlatform::new(),
        }
    }

    /// Collaborator set for a coordinator, with the given store provider
    pub fn collaborators(&self, store_provider: Arc<dyn StoreProvider>) -> Collaborators {
        Collaborators {
            store_provider,
            rooms: self.rooms.clone(),
            tracking: self.platform.clone(),
            codec: self.platform.clone(),
            session: self.session.clone(),
            notifications: self.notifications.clone(),
        }
    }
}
