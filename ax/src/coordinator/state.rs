//! Anchor management states
//!
//! The coordinator is always in exactly one of these states. Tick-driven
//! states perform their action on the next scheduler tick; suspension
//! states wait for an async completion; parked states wait for the global
//! reset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State tag of the anchor coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorState {
    /// Waiting for the platform anchor store to become available
    WaitingForAnchorStore,
    /// Store held; waiting for session and manager connectivity
    AnchorStoreReady,
    /// Kick off room acquisition
    InitializeRoom,
    /// Polling for the shared room (join, or create when elected)
    InitializingRoom,

    /// Resolve which remote anchor to adopt and consult the cache
    GetRemoteAnchor,
    /// Cached anchor loaded; waiting for its locate resolution
    GetRemoteAnchorStarting,

    /// Download request accepted; waiting for payload bytes
    RemoteAnchorDataRequest,
    /// Payload bytes held; import begins next tick
    RemoteAnchorDataReady,
    /// Waiting for async import of the payload
    RemoteAnchorAttaching,
    /// Imported anchor locked onto the placement target
    RemoteAnchorAttached,
    /// Download request was rejected; parked until reset
    RemoteAnchorAttachFailed,

    /// Mint (or reuse) the live local anchor
    CreateLocalAnchor,
    /// Waiting for the local anchor to be located
    CreatingLocalAnchor,
    /// Located; serialization begins next tick
    ReadyToExportLocalAnchor,
    /// Waiting for serialization chunks and the upload completion
    ExportingLocalAnchor,

    /// Upload confirmed; settle to Ready next tick
    LocalAnchorExported,
    /// Upload failed; parked until reset
    LocalAnchorExportFailed,

    /// Cache satisfied the resolution; settle to Ready next tick
    CachedAnchorAttached,

    /// Steady state; placement requests are accepted here
    Ready,
    /// Placement begins: local anchors and cache are cleared next tick
    AnchorPlacementStart,
    /// User is placing; waiting for the placement-done request
    AnchorPlacement,
    /// Placement finished; re-anchor or resume next tick
    AnchorPlacementDone,
}

impl AnchorState {
    /// States whose tick is a no-op because an async completion is due
    pub fn is_suspension(self) -> bool {
        matches!(
            self,
            AnchorState::WaitingForAnchorStore
                | AnchorState::GetRemoteAnchorStarting
                | AnchorState::RemoteAnchorDataRequest
                | AnchorState::RemoteAnchorAttaching
                | AnchorState::CreatingLocalAnchor
                | AnchorState::ExportingLocalAnchor
        )
    }

    /// Failure states that hold until the global reset pulls them out
    pub fn is_parked(self) -> bool {
        matches!(self, AnchorState::RemoteAnchorAttachFailed | AnchorState::LocalAnchorExportFailed)
    }

    /// States in which the placement UI may start a placement
    pub fn allows_placement(self) -> bool {
        matches!(self, AnchorState::Ready | AnchorState::AnchorStoreReady)
    }
}

impl fmt::Display for AnchorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspension_and_parked_are_disjoint() {
        let all = [
            AnchorState::WaitingForAnchorStore,
            AnchorState::AnchorStoreReady,
            AnchorState::InitializeRoom,
            AnchorState::InitializingRoom,
            AnchorState::GetRemoteAnchor,
            AnchorState::GetRemoteAnchorStarting,
            AnchorState::RemoteAnchorDataRequest,
            AnchorState::RemoteAnchorDataReady,
            AnchorState::RemoteAnchorAttaching,
            AnchorState::RemoteAnchorAttached,
            AnchorState::RemoteAnchorAttachFailed,
            AnchorState::CreateLocalAnchor,
            AnchorState::CreatingLocalAnchor,
            AnchorState::ReadyToExportLocalAnchor,
            AnchorState::ExportingLocalAnchor,
            AnchorState::LocalAnchorExported,
            AnchorState::LocalAnchorExportFailed,
            AnchorState::CachedAnchorAttached,
            AnchorState::Ready,
            AnchorState::AnchorPlacementStart,
            AnchorState::AnchorPlacement,
            AnchorState::AnchorPlacementDone,
        ];

        for state in all {
            assert!(!(state.is_suspension() && state.is_parked()), "{state} is both");
        }
    }

    #[test]
    fn test_placement_allowed_states() {
        assert!(AnchorState::Ready.allows_placement());
        assert!(AnchorState::AnchorStoreReady.allows_placement());
        assert!(!AnchorState::ExportingLocalAnchor.allows_placement());
        assert!(!AnchorState::AnchorPlacement.allows_placement());
    }

    #[test]
    fn test_display_names_variant() {
        assert_eq!(AnchorState::Ready.to_string(), "Ready");
        assert_eq!(AnchorState::WaitingForAnchorStore.to_string(), "WaitingForAnchorStore");
    }
}
