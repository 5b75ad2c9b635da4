//! CoordinatorHandle - client interface for the placement UI
//!
//! Cloneable; all operations go through the coordinator's mailbox, so the
//! caller never touches coordinator state directly.

use eyre::{Result, eyre};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordRequest, StateChange, StatusSnapshot};

/// Handle for callers to interact with a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordRequest>,
    state_tx: broadcast::Sender<StateChange>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, state_tx: broadcast::Sender<StateChange>) -> Self {
        Self { tx, state_tx }
    }

    /// Ask the coordinator to begin a placement
    ///
    /// Ignored (with a warn log) unless placement is currently allowed.
    pub async fn request_placement_start(&self) -> Result<()> {
        debug!("CoordinatorHandle::request_placement_start: called");
        self.tx
            .send(CoordRequest::PlacementStart)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// Tell the coordinator the placement finished
    pub async fn request_placement_end(&self) -> Result<()> {
        debug!("CoordinatorHandle::request_placement_end: called");
        self.tx
            .send(CoordRequest::PlacementDone)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// Snapshot the coordinator's state, flags, and room
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::GetStatus { reply: reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Whether a placement may start right now
    pub async fn is_placement_allowed(&self) -> Result<bool> {
        Ok(self.status().await?.state.allows_placement())
    }

    /// Subscribe to state transitions
    pub fn subscribe_states(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Request coordinator shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }
}
