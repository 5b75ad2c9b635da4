//! In-process sharing hub
//!
//! Loopback implementation of the room, session, and announcement
//! services: every participant in the process shares one hub, so multiple
//! coordinators can run the full protocol against each other without a
//! network. The hub doubles as the test substrate and carries
//! failure-injection knobs for the transfer paths.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::notify::{AnchorAnnouncement, NotificationChannel};
use crate::room::{Room, RoomError, RoomEvent, RoomService, TransferTicket};
use crate::session::{SessionEvent, SessionMembership};

/// Behavior of a transfer path (failure injection)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Requests are accepted and complete successfully
    Normal,
    /// Requests are rejected outright (no completion ever arrives)
    Reject,
    /// The next request completes with a failure, then back to Normal
    FailOnce,
    /// Every request completes with a failure
    Fail,
}

struct HubRoom {
    id: i64,
    name: String,
    #[allow(dead_code)]
    keep_alive: bool,
    /// Upload-ordered (name, payload) anchor slots
    anchors: Vec<(String, Vec<u8>)>,
}

struct HubState {
    rooms: Vec<HubRoom>,
    /// Joined participant IDs in join order
    users: Vec<i64>,
    download_mode: TransferMode,
    upload_mode: TransferMode,
    download_requests: u64,
}

/// Shared loopback hub; one per simulated session
pub struct SharingHub {
    state: Mutex<HubState>,
    room_events: broadcast::Sender<RoomEvent>,
    announcements: broadcast::Sender<AnchorAnnouncement>,
}

impl SharingHub {
    pub fn new() -> Arc<Self> {
        let (room_events, _) = broadcast::channel(256);
        let (announcements, _) = broadcast::channel(256);
        Arc::new(Self {
            state: Mutex::new(HubState {
                rooms: Vec::new(),
                users: Vec::new(),
                download_mode: TransferMode::Normal,
                upload_mode: TransferMode::Normal,
                download_requests: 0,
            }),
            room_events,
            announcements,
        })
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inject download behavior
    pub fn set_download_mode(&self, mode: TransferMode) {
        self.state().download_mode = mode;
    }

    /// Inject upload behavior
    pub fn set_upload_mode(&self, mode: TransferMode) {
        self.state().upload_mode = mode;
    }

    /// Number of download requests the hub has seen (accepted or not)
    pub fn download_request_count(&self) -> u64 {
        self.state().download_requests
    }

    /// Anchor names currently uploaded to a room, slot order
    pub fn room_anchor_names(&self, room_id: i64) -> Vec<String> {
        self.state()
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .map(|r| r.anchors.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    fn room_handle(state: &HubState, room_id: i64) -> Option<Room> {
        state.rooms.iter().find(|r| r.id == room_id).map(|r| Room {
            id: r.id,
            name: r.name.clone(),
        })
    }
}

/// Per-participant view of the hub's rooms
pub struct SimRoomService {
    hub: Arc<SharingHub>,
    user_id: i64,
    joined: Mutex<Option<i64>>,
}

impl SimRoomService {
    pub fn new(hub: Arc<SharingHub>, user_id: i64) -> Arc<Self> {
        Arc::new(Self {
            hub,
            user_id,
            joined: Mutex::new(None),
        })
    }

    fn joined(&self) -> MutexGuard<'_, Option<i64>> {
        self.joined.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RoomService for SimRoomService {
    fn current_room(&self) -> Option<Room> {
        let joined = *self.joined();
        let state = self.hub.state();
        joined.and_then(|id| SharingHub::room_handle(&state, id))
    }

    fn room_count(&self) -> usize {
        self.hub.state().rooms.len()
    }

    fn room_at(&self, index: usize) -> Option<Room> {
        let state = self.hub.state();
        state.rooms.get(index).map(|r| Room {
            id: r.id,
            name: r.name.clone(),
        })
    }

    fn create_room(&self, name: &str, id: i64, keep_alive: bool) -> Result<Room, RoomError> {
        let mut state = self.hub.state();
        if state.rooms.iter().any(|r| r.id == id) {
            return Err(RoomError::Rejected(format!("room {id} already exists")));
        }

        debug!(user_id = self.user_id, name, id, "SimRoomService::create_room");
        state.rooms.push(HubRoom {
            id,
            name: name.to_string(),
            keep_alive,
            anchors: Vec::new(),
        });
        drop(state);

        *self.joined() = Some(id);
        Ok(Room {
            id,
            name: name.to_string(),
        })
    }

    fn join_room(&self, room_id: i64) -> Result<Room, RoomError> {
        let state = self.hub.state();
        let room = SharingHub::room_handle(&state, room_id)
            .ok_or_else(|| RoomError::Rejected(format!("no room {room_id}")))?;
        drop(state);

        debug!(user_id = self.user_id, room_id, "SimRoomService::join_room");
        *self.joined() = Some(room_id);
        Ok(room)
    }

    fn anchor_count(&self, room_id: i64) -> usize {
        self.hub
            .state()
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .map(|r| r.anchors.len())
            .unwrap_or(0)
    }

    fn anchor_name_at(&self, room_id: i64, index: usize) -> Option<String> {
        self.hub
            .state()
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .and_then(|r| r.anchors.get(index))
            .map(|(name, _)| name.clone())
    }

    fn download_anchor(&self, room_id: i64, name: &str) -> Result<TransferTicket<Vec<u8>>, RoomError> {
        let mut state = self.hub.state();
        state.download_requests += 1;

        match state.download_mode {
            TransferMode::Reject => {
                return Err(RoomError::Rejected("download rejected by service".to_string()));
            }
            TransferMode::FailOnce => {
                state.download_mode = TransferMode::Normal;
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(Err(RoomError::Transfer("injected download failure".to_string())));
                return Ok(rx);
            }
            TransferMode::Fail => {
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(Err(RoomError::Transfer("injected download failure".to_string())));
                return Ok(rx);
            }
            TransferMode::Normal => {}
        }

        let payload = state
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .and_then(|r| r.anchors.iter().find(|(n, _)| n == name))
            .map(|(_, payload)| payload.clone());

        let (tx, rx) = oneshot::channel();
        match payload {
            Some(payload) => {
                let _ = tx.send(Ok(payload));
            }
            None => {
                let _ = tx.send(Err(RoomError::Transfer(format!("no anchor {name} in room {room_id}"))));
            }
        }
        Ok(rx)
    }

    fn upload_anchor(&self, room_id: i64, name: &str, payload: Vec<u8>) -> TransferTicket<()> {
        let (tx, rx) = oneshot::channel();

        if *self.joined() != Some(room_id) {
            let _ = tx.send(Err(RoomError::NotJoined(room_id)));
            return rx;
        }

        let mut state = self.hub.state();
        match state.upload_mode {
            TransferMode::FailOnce => {
                state.upload_mode = TransferMode::Normal;
                let _ = tx.send(Err(RoomError::Transfer("injected upload failure".to_string())));
                return rx;
            }
            TransferMode::Reject | TransferMode::Fail => {
                let _ = tx.send(Err(RoomError::Transfer("injected upload failure".to_string())));
                return rx;
            }
            TransferMode::Normal => {}
        }

        let Some(room) = state.rooms.iter_mut().find(|r| r.id == room_id) else {
            let _ = tx.send(Err(RoomError::Transfer(format!("no room {room_id}"))));
            return rx;
        };

        debug!(user_id = self.user_id, room_id, name, size = payload.len(), "SimRoomService::upload_anchor");
        room.anchors.push((name.to_string(), payload));
        drop(state);

        let _ = tx.send(Ok(()));
        let _ = self.hub.room_events.send(RoomEvent::AnchorsChanged { room_id });
        rx
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.hub.room_events.subscribe()
    }
}

/// Per-participant session membership over the hub
pub struct SimSession {
    hub: Arc<SharingHub>,
    user_id: i64,
    events: broadcast::Sender<SessionEvent>,
}

impl SimSession {
    pub fn new(hub: Arc<SharingHub>, user_id: i64) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self { hub, user_id, events })
    }

    /// Complete the sharing-manager handshake
    pub fn connect_manager(&self) {
        let _ = self.events.send(SessionEvent::ManagerConnected);
    }

    /// Establish transport and join the session
    pub fn join(&self) {
        let mut state = self.hub.state();
        if !state.users.contains(&self.user_id) {
            state.users.push(self.user_id);
        }
        drop(state);

        let _ = self.events.send(SessionEvent::ServerConnected);
        let _ = self.events.send(SessionEvent::Joined);
    }

    /// Leave the session
    pub fn leave(&self) {
        let mut state = self.hub.state();
        state.users.retain(|&id| id != self.user_id);
        drop(state);

        let _ = self.events.send(SessionEvent::Left);
    }

    /// Drop transport without leaving
    pub fn disconnect(&self) {
        let _ = self.events.send(SessionEvent::ServerDisconnected);
    }
}

impl SessionMembership for SimSession {
    fn local_id(&self) -> i64 {
        self.user_id
    }

    fn peer_ids(&self) -> Vec<i64> {
        self.hub.state().users.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Per-participant announcement channel over the hub
pub struct SimNotifications {
    hub: Arc<SharingHub>,
    user_id: i64,
}

impl SimNotifications {
    pub fn new(hub: Arc<SharingHub>, user_id: i64) -> Arc<Self> {
        Arc::new(Self { hub, user_id })
    }
}

impl NotificationChannel for SimNotifications {
    fn announce(&self, name: &str) {
        debug!(user_id = self.user_id, name, "SimNotifications::announce");
        let _ = self.hub.announcements.send(AnchorAnnouncement {
            from: self.user_id,
            name: name.to_string(),
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<AnchorAnnouncement> {
        self.hub.announcements.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_join_and_lookup() {
        let hub = SharingHub::new();
        let a = SimRoomService::new(hub.clone(), 1);
        let b = SimRoomService::new(hub.clone(), 2);

        let room = a.create_room("ShareRoom", 74656, true).unwrap();
        assert_eq!(a.current_room(), Some(room.clone()));
        assert_eq!(b.current_room(), None);
        assert_eq!(b.room_count(), 1);
        assert_eq!(b.room_at(0).unwrap().name, "ShareRoom");

        b.join_room(room.id).unwrap();
        assert_eq!(b.current_room(), Some(room));
    }

    #[test]
    fn test_duplicate_room_rejected() {
        let hub = SharingHub::new();
        let a = SimRoomService::new(hub.clone(), 1);

        a.create_room("ShareRoom", 1, false).unwrap();
        assert!(matches!(a.create_room("Other", 1, false), Err(RoomError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_upload_appends_slot_and_fires_event() {
        let hub = SharingHub::new();
        let a = SimRoomService::new(hub.clone(), 1);
        let room = a.create_room("ShareRoom", 7, true).unwrap();
        let mut events = a.subscribe();

        let ticket = a.upload_anchor(room.id, "anchor-a", vec![1, 2, 3]);
        assert!(ticket.await.unwrap().is_ok());

        assert_eq!(a.anchor_count(room.id), 1);
        assert_eq!(a.anchor_name_at(room.id, 0), Some("anchor-a".to_string()));
        assert!(matches!(
            events.recv().await.unwrap(),
            RoomEvent::AnchorsChanged { room_id } if room_id == room.id
        ));
    }

    #[tokio::test]
    async fn test_download_roundtrip() {
        let hub = SharingHub::new();
        let a = SimRoomService::new(hub.clone(), 1);
        let room = a.create_room("ShareRoom", 7, true).unwrap();
        a.upload_anchor(room.id, "anchor-a", vec![9; 64]).await.unwrap().unwrap();

        let ticket = a.download_anchor(room.id, "anchor-a").unwrap();
        assert_eq!(ticket.await.unwrap().unwrap(), vec![9; 64]);
        assert_eq!(hub.download_request_count(), 1);
    }

    #[tokio::test]
    async fn test_download_modes() {
        let hub = SharingHub::new();
        let a = SimRoomService::new(hub.clone(), 1);
        let room = a.create_room("ShareRoom", 7, true).unwrap();
        a.upload_anchor(room.id, "anchor-a", vec![1]).await.unwrap().unwrap();

        hub.set_download_mode(TransferMode::Reject);
        assert!(a.download_anchor(room.id, "anchor-a").is_err());

        hub.set_download_mode(TransferMode::FailOnce);
        let ticket = a.download_anchor(room.id, "anchor-a").unwrap();
        assert!(ticket.await.unwrap().is_err());

        // FailOnce resets to Normal
        let ticket = a.download_anchor(room.id, "anchor-a").unwrap();
        assert!(ticket.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_upload_requires_join() {
        let hub = SharingHub::new();
        let a = SimRoomService::new(hub.clone(), 1);
        let b = SimRoomService::new(hub.clone(), 2);
        let room = a.create_room("ShareRoom", 7, true).unwrap();

        let ticket = b.upload_anchor(room.id, "anchor-b", vec![1]);
        assert!(matches!(ticket.await.unwrap(), Err(RoomError::NotJoined(_))));
    }

    #[tokio::test]
    async fn test_session_membership_and_events() {
        let hub = SharingHub::new();
        let s1 = SimSession::new(hub.clone(), 5);
        let s2 = SimSession::new(hub.clone(), 3);
        let mut events = s1.subscribe();

        s1.join();
        s2.join();
        assert_eq!(s1.peer_ids(), vec![5, 3]);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::ServerConnected);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Joined);

        s2.leave();
        assert_eq!(s1.peer_ids(), vec![5]);
    }

    #[tokio::test]
    async fn test_announcements_carry_sender() {
        let hub = SharingHub::new();
        let n1 = SimNotifications::new(hub.clone(), 1);
        let n2 = SimNotifications::new(hub.clone(), 2);
        let mut inbox = n2.subscribe();

        n1.announce("anchor-x");

        let ann = inbox.recv().await.unwrap();
        assert_eq!(ann.from, 1);
        assert_eq!(ann.name, "anchor-x");
    }
}
