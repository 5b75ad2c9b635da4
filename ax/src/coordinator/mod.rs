//! Anchor coordination state machine
//!
//! One coordinator per shared session decides, at any moment, whether the
//! local participant should wait, create and publish a fresh anchor, or
//! fetch and adopt a peer's anchor, reconciling with the local cache and
//! tolerating unreliable async completions from the platform and network.

mod config;
mod core;
mod handle;
mod messages;
mod state;

pub use config::CoordinatorConfig;
pub use core::{Collaborators, Coordinator};
pub use handle::CoordinatorHandle;
pub use messages::{CoordRequest, StateChange, StatusFlags, StatusSnapshot};
pub use state::AnchorState;
