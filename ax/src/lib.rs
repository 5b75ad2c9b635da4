//! AnchorSync - distributed spatial-anchor synchronization
//!
//! AnchorSync coordinates, across networked participants, the creation,
//! serialization, transfer, caching, and consistent adoption of a shared
//! spatial reference frame (an "anchor") so every device renders shared
//! content in the same physical location.
//!
//! # Core Concepts
//!
//! - **Single Writer**: one coordinator task per session owns its state;
//!   collaborator callbacks post tagged completions into its mailbox
//! - **Cache First**: a resolution consults the local anchor cache before
//!   issuing any network fetch, and writes adopted payloads back through
//! - **Trust by Size**: a serialized anchor below the configured size
//!   threshold is rejected and re-created, never published
//! - **Lowest ID Creates**: room creation is elected coordination-free by
//!   the lowest stable session ID
//!
//! # Modules
//!
//! - [`coordinator`] - the anchor management state machine
//! - [`room`] - shared-room service interface and leader election
//! - [`platform`] - tracking, serialization, and store-readiness interfaces
//! - [`session`] - session membership interface
//! - [`notify`] - peer anchor announcements
//! - [`sim`] - in-process loopback implementations of the collaborators
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod notify;
pub mod platform;
pub mod room;
pub mod session;
pub mod sim;

// Re-export commonly used types
pub use config::{Config, StorageConfig};
pub use coordinator::{
    AnchorState, Collaborators, CoordRequest, Coordinator, CoordinatorConfig, CoordinatorHandle, StateChange,
    StatusFlags, StatusSnapshot,
};
pub use notify::{AnchorAnnouncement, NotificationChannel};
pub use platform::{
    AnchorBatch, AnchorCodec, AnchorHandle, CodecError, DiskStoreProvider, ExportJob, ExportStatus,
    MemoryStoreProvider, StoreProvider, TrackingError, TrackingProvider,
};
pub use room::{Room, RoomError, RoomEvent, RoomService, TransferTicket, should_create_room};
pub use session::{SessionEvent, SessionMembership};
