//! Anchor coordinator task
//!
//! One coordinator runs per shared session. It is the sole writer of its
//! state: collaborator callbacks never mutate anything directly, they post
//! tagged completions into the mailbox, and a scheduler tick drives the
//! tick-triggered states. Suspension states no-op on tick and advance only
//! when their completion arrives; stale completions (superseded by a newer
//! request or a reset) are discarded by token.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use anchorstore::AnchorStore;

use crate::notify::{AnchorAnnouncement, NotificationChannel};
use crate::platform::{AnchorBatch, AnchorCodec, CodecError, ExportJob, ExportStatus, StoreProvider, TrackingProvider};
use crate::room::{RoomError, RoomEvent, RoomService, TransferTicket, should_create_room};
use crate::session::{SessionEvent, SessionMembership};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{CoordRequest, StateChange, StatusFlags, StatusSnapshot};
use super::state::AnchorState;

/// The collaborator services a coordinator is wired to
///
/// Injected at construction; the coordinator reaches no ambient globals.
#[derive(Clone)]
pub struct Collaborators {
    pub store_provider: Arc<dyn StoreProvider>,
    pub rooms: Arc<dyn RoomService>,
    pub tracking: Arc<dyn TrackingProvider>,
    pub codec: Arc<dyn AnchorCodec>,
    pub session: Arc<dyn SessionMembership>,
    pub notifications: Arc<dyn NotificationChannel>,
}

/// The anchor coordinator state machine
pub struct Coordinator {
    config: CoordinatorConfig,
    collab: Collaborators,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    state_tx: broadcast::Sender<StateChange>,

    state: AnchorState,
    previous_placement_state: AnchorState,
    flags: StatusFlags,
    status_line: String,

    store: Option<Arc<AnchorStore>>,
    current_room: Option<crate::room::Room>,
    anchor: Option<crate::platform::AnchorHandle>,

    /// Byte accumulator for the export in progress
    export_buf: Vec<u8>,
    /// Name minted for the export in progress
    exporting_name: Option<String>,
    /// Downloaded payload awaiting (or retrying) import
    pending_bytes: Option<Vec<u8>>,
    /// Anchor name being adopted this resolution cycle
    resolved_name: Option<String>,
    /// Peer-pushed name override; consumed once at resolution
    pushed_name: Option<String>,

    token_seq: u64,
    locate_token: Option<u64>,
    download_token: Option<u64>,
    upload_token: Option<u64>,
    export_token: Option<u64>,
    import_token: Option<u64>,

    waiting_room_logged: bool,
    no_remote_logged: bool,
}

impl Coordinator {
    /// Create a coordinator wired to the given collaborators
    pub fn new(config: CoordinatorConfig, collab: Collaborators) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let (state_tx, _) = broadcast::channel(256);
        Self {
            config,
            collab,
            tx,
            rx,
            state_tx,
            state: AnchorState::WaitingForAnchorStore,
            previous_placement_state: AnchorState::WaitingForAnchorStore,
            flags: StatusFlags::default(),
            status_line: String::new(),
            store: None,
            current_room: None,
            anchor: None,
            export_buf: Vec::new(),
            exporting_name: None,
            pending_bytes: None,
            resolved_name: None,
            pushed_name: None,
            token_seq: 0,
            locate_token: None,
            download_token: None,
            upload_token: None,
            export_token: None,
            import_token: None,
            waiting_room_logged: false,
            no_remote_logged: false,
        }
    }

    /// Create a handle for callers
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), self.state_tx.clone())
    }

    /// Run the coordinator until shutdown
    ///
    /// Consumes the coordinator; the scheduler tick and every collaborator
    /// event funnel through this single loop.
    pub async fn run(mut self) {
        info!(room = %self.config.room_name, "Anchor coordinator started");

        let mut session_rx = self.collab.session.subscribe();
        let mut room_rx = self.collab.rooms.subscribe();
        let mut announce_rx = self.collab.notifications.subscribe();

        self.spawn_store_acquisition();

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                req = self.rx.recv() => match req {
                    Some(CoordRequest::Shutdown) | None => break,
                    Some(req) => self.handle_request(req),
                },
                Ok(ev) = session_rx.recv() => self.on_session_event(ev),
                Ok(ev) = room_rx.recv() => self.on_room_event(ev),
                Ok(ann) = announce_rx.recv() => self.on_announcement(ann),
            }
        }

        info!("Anchor coordinator stopped");
    }

    // === Tick dispatch ===

    /// Advance the machine by one scheduler tick
    ///
    /// Suspension states are no-ops here; their completions arrive through
    /// the mailbox.
    fn tick(&mut self) {
        match self.state {
            AnchorState::AnchorStoreReady => {
                if self.flags.manager_connected && self.flags.session_connected {
                    self.set_state(AnchorState::InitializeRoom);
                }
            }
            AnchorState::InitializeRoom => {
                self.waiting_room_logged = false;
                self.set_state(AnchorState::InitializingRoom);
            }
            AnchorState::InitializingRoom => self.poll_room_acquisition(),
            AnchorState::GetRemoteAnchor => self.resolve_remote_anchor(),
            AnchorState::RemoteAnchorDataReady => self.begin_import(),
            AnchorState::RemoteAnchorAttached => self.set_state(AnchorState::Ready),
            AnchorState::CachedAnchorAttached => self.set_state(AnchorState::Ready),
            AnchorState::CreateLocalAnchor => self.begin_local_anchor(),
            AnchorState::ReadyToExportLocalAnchor => self.begin_export(),
            AnchorState::LocalAnchorExported => self.set_state(AnchorState::Ready),
            AnchorState::AnchorPlacementStart => self.clear_placement_anchors(),
            AnchorState::AnchorPlacementDone => self.finish_placement(),

            // Suspension, parked, and steady states
            AnchorState::WaitingForAnchorStore
            | AnchorState::GetRemoteAnchorStarting
            | AnchorState::RemoteAnchorDataRequest
            | AnchorState::RemoteAnchorAttaching
            | AnchorState::RemoteAnchorAttachFailed
            | AnchorState::CreatingLocalAnchor
            | AnchorState::ExportingLocalAnchor
            | AnchorState::LocalAnchorExportFailed
            | AnchorState::Ready
            | AnchorState::AnchorPlacement => {}
        }
    }

    // === Mailbox dispatch ===

    fn handle_request(&mut self, req: CoordRequest) {
        match req {
            CoordRequest::PlacementStart => self.on_placement_start(),
            CoordRequest::PlacementDone => self.on_placement_done(),
            CoordRequest::GetStatus { reply } => {
                let _ = reply.send(self.snapshot());
            }
            CoordRequest::Shutdown => debug!("shutdown handled by run loop"),
            CoordRequest::StoreReady { store } => self.on_store_ready(store),
            CoordRequest::LocateResolved { token, located } => self.on_locate_resolved(token, located),
            CoordRequest::DownloadCompleted { token, result } => self.on_download_completed(token, result),
            CoordRequest::UploadCompleted { token, result } => self.on_upload_completed(token, result),
            CoordRequest::ExportChunk { token, bytes } => self.on_export_chunk(token, bytes),
            CoordRequest::ExportCompleted { token, status } => self.on_export_completed(token, status),
            CoordRequest::ImportCompleted { token, result } => self.on_import_completed(token, result),
        }
    }

    // === Collaborator events ===

    fn on_store_ready(&mut self, store: Arc<AnchorStore>) {
        info!("anchor store ready");

        if !self.config.keep_room_alive {
            match store.clear() {
                Ok(removed) => info!(removed, "cleared anchor cache (room not kept alive)"),
                Err(e) => warn!(error = %e, "failed to clear anchor cache"),
            }
        }

        self.store = Some(store);
        self.set_state(AnchorState::AnchorStoreReady);
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ManagerConnected => {
                info!("sharing manager connected");
                self.flags.manager_connected = true;
            }
            SessionEvent::ServerConnected => {
                info!("sharing server connected");
                self.flags.session_connected = true;
            }
            SessionEvent::ServerDisconnected => {
                info!("sharing server disconnected");
                self.flags.session_connected = false;
            }
            SessionEvent::Joined => {
                self.flags.session_connected = true;
            }
            SessionEvent::Left => {
                info!("left session; resetting");
                self.flags.session_connected = false;
                // A rejoin performs a fresh room lookup
                self.current_room = None;
                self.reset();
            }
        }
    }

    fn on_room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::AnchorsChanged { room_id } => {
                if self.current_room.as_ref().map(|r| r.id) == Some(room_id) {
                    info!(room_id, "anchors changed in current room; resetting");
                    self.set_status("Anchors in room changed");
                    self.reset();
                } else {
                    debug!(room_id, "anchors changed in another room; ignoring");
                }
            }
        }
    }

    fn on_announcement(&mut self, announcement: AnchorAnnouncement) {
        if announcement.from == self.collab.session.local_id() {
            return;
        }
        debug!(from = announcement.from, name = %announcement.name, "peer announced new anchor");
        // Latest pushed name wins until a resolution consumes it
        self.pushed_name = Some(announcement.name);
    }

    // === External requests ===

    fn on_placement_start(&mut self) {
        if !self.state.allows_placement() {
            warn!(state = %self.state, "placement start ignored");
            return;
        }
        self.previous_placement_state = self.state;
        debug!(previous = %self.previous_placement_state, "placement starting");
        self.set_state(AnchorState::AnchorPlacementStart);
    }

    fn on_placement_done(&mut self) {
        if !matches!(self.state, AnchorState::AnchorPlacementStart | AnchorState::AnchorPlacement) {
            warn!(state = %self.state, "placement done ignored");
            return;
        }
        self.set_state(AnchorState::AnchorPlacementDone);
    }

    // === Room acquisition ===

    fn poll_room_acquisition(&mut self) {
        if self.current_room.is_none() {
            if let Some(room) = self.collab.rooms.current_room() {
                info!(room = %room.name, room_id = room.id, "already in room");
                self.current_room = Some(room);
            } else if self.collab.rooms.room_count() == 0 {
                let local_id = self.collab.session.local_id();
                let peers = self.collab.session.peer_ids();
                if should_create_room(local_id, &peers) {
                    match self
                        .collab
                        .rooms
                        .create_room(&self.config.room_name, self.config.room_id, self.config.keep_room_alive)
                    {
                        Ok(room) => {
                            info!(room = %room.name, room_id = room.id, "created room");
                            self.set_status(format!("Created room {}", room.name));
                            self.current_room = Some(room);
                        }
                        Err(e) => warn!(error = %e, "room creation failed"),
                    }
                } else if !self.waiting_room_logged {
                    self.waiting_room_logged = true;
                    info!(local_id, "waiting for the elected peer to create the room");
                }
            } else {
                let count = self.collab.rooms.room_count();
                let matched = (0..count)
                    .filter_map(|i| self.collab.rooms.room_at(i))
                    .find(|room| room.name.eq_ignore_ascii_case(&self.config.room_name));

                match matched {
                    Some(room) => match self.collab.rooms.join_room(room.id) {
                        Ok(room) => {
                            info!(room = %room.name, room_id = room.id, "joined room");
                            self.set_status(format!("Joined room {}", room.name));
                            self.current_room = Some(room);
                        }
                        Err(e) => warn!(room_id = room.id, error = %e, "room join failed"),
                    },
                    None if !self.waiting_room_logged => {
                        self.waiting_room_logged = true;
                        info!(room = %self.config.room_name, "no matching room; waiting for first session user to create it");
                        self.set_status(format!("Cannot find matching room {}; waiting", self.config.room_name));
                    }
                    None => {}
                }
            }
        }

        let Some(room) = self.current_room.clone() else {
            return;
        };

        let anchors = self.collab.rooms.anchor_count(room.id);
        info!(room = %room.name, room_id = room.id, anchors, "room acquired");
        self.set_status(format!("In room {} with {} anchor(s)", room.name, anchors));

        if anchors == 0 && self.collab.tracking.supports_anchor_creation() {
            self.set_state(AnchorState::CreateLocalAnchor);
        } else {
            self.set_state(AnchorState::GetRemoteAnchor);
        }
    }

    // === Remote anchor adoption ===

    fn resolve_remote_anchor(&mut self) {
        self.flags.anchor_configured = false;
        self.flags.local_anchor = false;

        let Some(room) = self.current_room.clone() else {
            warn!("no room while resolving remote anchor; resetting");
            self.reset();
            return;
        };

        // A peer-pushed name takes priority over the newest room slot
        let name = self.pushed_name.take().or_else(|| {
            let count = self.collab.rooms.anchor_count(room.id);
            if count > 0 {
                self.collab.rooms.anchor_name_at(room.id, count - 1)
            } else {
                None
            }
        });

        let Some(name) = name else {
            if !self.no_remote_logged {
                self.no_remote_logged = true;
                info!("no remote anchors defined; waiting for updates");
                self.set_status("No remote anchors defined; waiting for updates");
            }
            return;
        };

        self.no_remote_logged = false;
        self.resolved_name = Some(name.clone());
        info!(name = %name, "resolving remote anchor");

        if let Some(payload) = self.load_cached(&name) {
            match self.collab.tracking.adopt_cached(&name, &payload, &self.config.placement_target) {
                Ok(anchor) => {
                    if self.collab.tracking.is_located(&anchor) {
                        info!(name = %name, "attached to cached anchor");
                        self.set_status(format!("Attached cached anchor {name}"));
                        self.anchor = Some(anchor);
                        self.flags.anchor_located = true;
                        self.flags.anchor_configured = true;
                        self.flags.local_anchor = false;
                        self.set_state(AnchorState::CachedAnchorAttached);
                    } else {
                        debug!(name = %name, "cached anchor not located yet");
                        self.flags.anchor_located = false;
                        let token = self.next_token();
                        self.locate_token = Some(token);
                        let rx = self.collab.tracking.locate_once(&anchor);
                        self.spawn_locate_wait(rx, token);
                        self.anchor = Some(anchor);
                        self.set_state(AnchorState::GetRemoteAnchorStarting);
                    }
                    return;
                }
                Err(e) => warn!(name = %name, error = %e, "cached anchor unusable; downloading"),
            }
        }

        self.request_download(&name);
    }

    fn load_cached(&self, name: &str) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        match store.load(name) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(name, error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn request_download(&mut self, name: &str) {
        let Some(room) = self.current_room.clone() else {
            warn!("no room to download from");
            self.set_state(AnchorState::RemoteAnchorAttachFailed);
            return;
        };

        match self.collab.rooms.download_anchor(room.id, name) {
            Ok(ticket) => {
                let token = self.next_token();
                self.download_token = Some(token);
                self.spawn_download_wait(ticket, token);
                info!(name, "anchor download requested");
                self.set_state(AnchorState::RemoteAnchorDataRequest);
            }
            Err(e) => {
                error!(name, error = %e, "could not make the download request");
                self.set_status("Couldn't make the download request");
                self.set_state(AnchorState::RemoteAnchorAttachFailed);
            }
        }
    }

    fn on_download_completed(&mut self, token: u64, result: Result<Vec<u8>, RoomError>) {
        if self.download_token != Some(token) {
            debug!(token, "stale download completion discarded");
            return;
        }
        self.download_token = None;

        if self.state != AnchorState::RemoteAnchorDataRequest {
            debug!(state = %self.state, "download completed outside request state; ignoring");
            return;
        }

        match result {
            Ok(bytes) => {
                info!(size = bytes.len(), "remote anchor downloaded");
                self.set_status(format!("Remote anchor download size: {} bytes", bytes.len()));
                self.pending_bytes = Some(bytes);
                self.set_state(AnchorState::RemoteAnchorDataReady);
            }
            Err(e) => {
                warn!(error = %e, "anchor download failed; retrying");
                self.set_status(format!("Anchor download failed: {e}"));
                match self.resolved_name.clone() {
                    Some(name) => self.request_download(&name),
                    None => self.set_state(AnchorState::RemoteAnchorAttachFailed),
                }
            }
        }
    }

    fn begin_import(&mut self) {
        let Some(bytes) = self.pending_bytes.clone() else {
            warn!("no downloaded payload to import; re-resolving");
            self.set_state(AnchorState::GetRemoteAnchor);
            return;
        };

        let token = self.next_token();
        self.import_token = Some(token);
        let rx = self.collab.codec.import(bytes);
        self.spawn_import_wait(rx, token);
        self.set_state(AnchorState::RemoteAnchorAttaching);
    }

    fn on_import_completed(&mut self, token: u64, result: Result<AnchorBatch, CodecError>) {
        if self.import_token != Some(token) {
            debug!(token, "stale import completion discarded");
            return;
        }
        self.import_token = None;

        if self.state != AnchorState::RemoteAnchorAttaching {
            debug!(state = %self.state, "import completed outside attach state; ignoring");
            return;
        }

        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "remote anchor import failed");
                self.set_status("Remote anchor attach failed");
                self.flags.anchor_configured = false;
                self.set_state(AnchorState::RemoteAnchorDataReady);
                return;
            }
        };

        if let Some(first) = batch.ids.first() {
            // The cache key stays the requested name, not the batch's own id
            debug!(batch_id = %first, "import reported batch id");
        }

        match self.collab.tracking.attach_batch(&batch, &self.config.placement_target) {
            Ok(anchor) => {
                if let Some(name) = self.resolved_name.take() {
                    if let (Some(store), Some(bytes)) = (&self.store, &self.pending_bytes)
                        && let Err(e) = store.save(&name, bytes)
                    {
                        warn!(name = %name, error = %e, "cache write-through failed");
                    }
                    info!(name = %name, "attached remote anchor");
                    self.set_status(format!("Attached remote anchor {name}"));
                }

                self.pending_bytes = None;
                self.pushed_name = None;
                self.flags.anchor_located = self.collab.tracking.is_located(&anchor);
                self.flags.anchor_configured = true;
                self.flags.local_anchor = false;
                self.anchor = Some(anchor);
                self.set_state(AnchorState::RemoteAnchorAttached);
            }
            Err(e) => {
                error!(error = %e, "remote anchor attach failed");
                self.flags.anchor_configured = false;
                self.set_state(AnchorState::RemoteAnchorDataReady);
            }
        }
    }

    // === Local anchor creation & export ===

    fn begin_local_anchor(&mut self) {
        let anchor = self.collab.tracking.ensure_anchor(&self.config.placement_target);
        self.flags.local_anchor = true;
        self.flags.anchor_configured = false;
        self.export_buf.clear();
        self.exporting_name = None;

        if self.collab.tracking.is_located(&anchor) {
            self.flags.anchor_located = true;
            self.anchor = Some(anchor);
            self.set_state(AnchorState::ReadyToExportLocalAnchor);
        } else {
            self.flags.anchor_located = false;
            let token = self.next_token();
            self.locate_token = Some(token);
            let rx = self.collab.tracking.locate_once(&anchor);
            self.spawn_locate_wait(rx, token);
            self.anchor = Some(anchor);
            self.set_state(AnchorState::CreatingLocalAnchor);
        }
    }

    fn on_locate_resolved(&mut self, token: u64, located: bool) {
        if self.locate_token != Some(token) {
            debug!(token, "stale locate resolution discarded");
            return;
        }
        self.locate_token = None;

        match self.state {
            AnchorState::GetRemoteAnchorStarting => {
                if located {
                    info!("cached anchor located");
                    self.flags.anchor_located = true;
                    self.flags.anchor_configured = true;
                    self.flags.local_anchor = false;
                    self.set_state(AnchorState::CachedAnchorAttached);
                } else {
                    warn!("failed to find local anchor from cache; downloading");
                    self.set_status("Failed to find local anchor from cache");
                    self.flags.anchor_located = false;
                    match self.resolved_name.clone() {
                        Some(name) => self.request_download(&name),
                        None => self.set_state(AnchorState::GetRemoteAnchor),
                    }
                }
            }
            AnchorState::CreatingLocalAnchor => {
                if located {
                    info!("local anchor located; ready to export");
                    self.set_status("Found anchor, ready to export");
                    self.flags.anchor_located = true;
                    self.set_state(AnchorState::ReadyToExportLocalAnchor);
                } else {
                    error!("failed to locate local anchor");
                    self.flags.anchor_located = false;
                    // Keep waiting for the world to be mapped
                    if let Some(anchor) = self.anchor.clone() {
                        let token = self.next_token();
                        self.locate_token = Some(token);
                        let rx = self.collab.tracking.locate_once(&anchor);
                        self.spawn_locate_wait(rx, token);
                    }
                }
            }
            _ => debug!(state = %self.state, "locate resolution outside tracking state; ignoring"),
        }
    }

    fn begin_export(&mut self) {
        let Some(anchor) = self.anchor.clone() else {
            error!("no live anchor to export");
            self.set_state(AnchorState::LocalAnchorExportFailed);
            return;
        };

        let name = Uuid::new_v4().to_string();
        info!(name = %name, "exporting local anchor");
        self.set_status(format!("Exporting anchor {name}"));

        self.exporting_name = Some(name.clone());
        self.export_buf.clear();

        let token = self.next_token();
        self.export_token = Some(token);
        let job = self.collab.codec.export(&name, &anchor);
        self.spawn_export_pump(job, token);
        self.set_state(AnchorState::ExportingLocalAnchor);
    }

    fn on_export_chunk(&mut self, token: u64, bytes: Vec<u8>) {
        if self.export_token != Some(token) {
            debug!(token, "stale export chunk discarded");
            return;
        }
        self.export_buf.extend_from_slice(&bytes);
    }

    fn on_export_completed(&mut self, token: u64, status: ExportStatus) {
        if self.export_token != Some(token) {
            debug!(token, "stale export completion discarded");
            return;
        }
        self.export_token = None;

        let size = self.export_buf.len() as u64;
        let min = self.config.min_trustworthy_anchor_bytes;
        let trustworthy = status == ExportStatus::Succeeded && size > min;
        self.set_status(format!("Export size {size}/{min}: {trustworthy}"));

        if !trustworthy {
            // Too little data means too little captured surface detail;
            // re-create the anchor rather than re-serialize it
            warn!(size, min, ?status, "untrustworthy export; recreating anchor");
            self.export_buf.clear();
            self.exporting_name = None;
            self.set_state(AnchorState::CreateLocalAnchor);
            return;
        }

        let Some(name) = self.exporting_name.clone() else {
            error!("export completed without a minted name");
            self.set_state(AnchorState::LocalAnchorExportFailed);
            return;
        };
        let Some(room) = self.current_room.clone() else {
            error!("no room to upload the anchor to");
            self.set_state(AnchorState::LocalAnchorExportFailed);
            return;
        };

        if let Some(store) = &self.store
            && let Err(e) = store.save(&name, &self.export_buf)
        {
            // Recoverable: the next resolution falls back to download
            warn!(name = %name, error = %e, "cache write failed");
        }

        let token = self.next_token();
        self.upload_token = Some(token);
        let ticket = self.collab.rooms.upload_anchor(room.id, &name, self.export_buf.clone());
        self.spawn_upload_wait(ticket, token);
        self.collab.notifications.announce(&name);
        info!(name = %name, size, "uploading anchor");
    }

    fn on_upload_completed(&mut self, token: u64, result: Result<(), RoomError>) {
        if self.upload_token != Some(token) {
            debug!(token, "stale upload completion discarded");
            return;
        }
        self.upload_token = None;

        if self.state != AnchorState::ExportingLocalAnchor {
            debug!(state = %self.state, "upload completed outside export state; ignoring");
            return;
        }

        match result {
            Ok(()) => {
                info!("successfully exported local anchor");
                self.set_status("Successfully exported local anchor");
                self.flags.anchor_configured = true;
                self.set_state(AnchorState::LocalAnchorExported);
            }
            Err(e) => {
                error!(error = %e, "anchor export failed");
                self.set_status(format!("Anchor export failed: {e}"));
                self.set_state(AnchorState::LocalAnchorExportFailed);
            }
        }
    }

    // === Placement ===

    fn clear_placement_anchors(&mut self) {
        self.collab.tracking.destroy_anchors(&self.config.placement_target);
        self.anchor = None;

        // Destroying placement anchors invalidates the entire cache
        if let Some(store) = &self.store {
            match store.clear() {
                Ok(removed) => info!(removed, "cache cleared for placement"),
                Err(e) => warn!(error = %e, "failed to clear cache for placement"),
            }
        }

        self.set_state(AnchorState::AnchorPlacement);
    }

    fn finish_placement(&mut self) {
        if self.previous_placement_state == AnchorState::Ready {
            // Re-anchor fresh at the new placement
            self.set_state(AnchorState::CreateLocalAnchor);
        } else {
            let previous = self.previous_placement_state;
            self.set_state(previous);
        }
    }

    // === Reset ===

    /// Global interrupt: room anchors changed or session membership lost
    fn reset(&mut self) {
        self.flags.local_anchor = false;
        self.flags.anchor_configured = false;
        self.invalidate_inflight();
        self.export_buf.clear();
        self.exporting_name = None;
        self.pending_bytes = None;
        self.resolved_name = None;
        self.waiting_room_logged = false;
        self.no_remote_logged = false;

        if self.store.is_some() {
            self.set_state(AnchorState::AnchorStoreReady);
        } else {
            self.set_state(AnchorState::WaitingForAnchorStore);
        }
    }

    /// Make every outstanding async completion stale
    fn invalidate_inflight(&mut self) {
        self.locate_token = None;
        self.download_token = None;
        self.upload_token = None;
        self.export_token = None;
        self.import_token = None;
    }

    // === Helpers ===

    fn next_token(&mut self) -> u64 {
        self.token_seq += 1;
        self.token_seq
    }

    fn set_state(&mut self, next: AnchorState) {
        let change = StateChange {
            from: self.state,
            to: next,
        };
        info!(from = %change.from, to = %change.to, "state change");
        self.state = next;
        let _ = self.state_tx.send(change);
    }

    fn set_status(&mut self, line: impl Into<String>) {
        self.status_line = line.into();
        debug!(status = %self.status_line, "status");
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            flags: self.flags,
            room: self.current_room.clone(),
            status_line: self.status_line.clone(),
        }
    }

    // === Completion forwarders ===

    fn spawn_store_acquisition(&self) {
        let provider = self.collab.store_provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match provider.acquire().await {
                Ok(store) => {
                    let _ = tx.send(CoordRequest::StoreReady { store }).await;
                }
                Err(e) => error!(error = %e, "anchor store unavailable"),
            }
        });
    }

    fn spawn_locate_wait(&self, rx: oneshot::Receiver<bool>, token: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let located = rx.await.unwrap_or(false);
            let _ = tx.send(CoordRequest::LocateResolved { token, located }).await;
        });
    }

    fn spawn_download_wait(&self, ticket: TransferTicket<Vec<u8>>, token: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = ticket.await.unwrap_or(Err(RoomError::Unavailable));
            let _ = tx.send(CoordRequest::DownloadCompleted { token, result }).await;
        });
    }

    fn spawn_upload_wait(&self, ticket: TransferTicket<()>, token: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = ticket.await.unwrap_or(Err(RoomError::Unavailable));
            let _ = tx.send(CoordRequest::UploadCompleted { token, result }).await;
        });
    }

    fn spawn_import_wait(&self, rx: oneshot::Receiver<Result<AnchorBatch, CodecError>>, token: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = rx
                .await
                .unwrap_or_else(|_| Err(CodecError::Import("codec dropped the import".to_string())));
            let _ = tx.send(CoordRequest::ImportCompleted { token, result }).await;
        });
    }

    fn spawn_export_pump(&self, job: ExportJob, token: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let ExportJob { mut chunks, completed } = job;
            while let Some(bytes) = chunks.recv().await {
                if tx.send(CoordRequest::ExportChunk { token, bytes }).await.is_err() {
                    return;
                }
            }
            let status = completed
                .await
                .unwrap_or(ExportStatus::Failed("serializer dropped".to_string()));
            let _ = tx.send(CoordRequest::ExportCompleted { token, status }).await;
        });
    }
}
