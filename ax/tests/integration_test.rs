//! Integration tests for AnchorSync
//!
//! These tests verify end-to-end protocol behavior: coordinators running
//! as real tasks on one loopback hub, converging on a shared anchor.

use std::sync::Arc;
use std::time::Duration;

use anchorsync::coordinator::{AnchorState, Coordinator, CoordinatorConfig, CoordinatorHandle};
use anchorsync::platform::MemoryStoreProvider;
use anchorsync::sim::{SharingHub, SimParticipant};

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        tick_ms: 5,
        ..Default::default()
    }
}

fn spawn_coordinator(participant: &SimParticipant, config: CoordinatorConfig) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
    let coordinator = Coordinator::new(config, participant.collaborators(Arc::new(MemoryStoreProvider)));
    let handle = coordinator.handle();
    let task = tokio::spawn(coordinator.run());
    (handle, task)
}

async fn wait_for_state(handle: &CoordinatorHandle, state: AnchorState, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if handle.status().await.map(|s| s.state == state).unwrap_or(false) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_coordinator_starts_and_stops() {
    let hub = SharingHub::new();
    let participant = SimParticipant::new(&hub, 1);
    let (handle, task) = spawn_coordinator(&participant, fast_config());

    // Give it time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.status().await.expect("status should be answerable");
    assert_eq!(status.state, AnchorState::AnchorStoreReady);

    handle.shutdown().await.expect("Should be able to send shutdown");

    let result = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert!(result.is_ok(), "Coordinator should shut down gracefully");
}

#[tokio::test]
async fn test_two_participants_converge_on_shared_anchor() {
    let hub = SharingHub::new();
    let config = fast_config();

    let leader = SimParticipant::new(&hub, 1);
    let joiner = SimParticipant::new(&hub, 7);

    let (leader_handle, leader_task) = spawn_coordinator(&leader, config.clone());
    let (joiner_handle, joiner_task) = spawn_coordinator(&joiner, config.clone());

    // Leader connects first, creates the room, and publishes the anchor
    leader.session.connect_manager();
    leader.session.join();
    assert!(
        wait_for_state(&leader_handle, AnchorState::Ready, Duration::from_secs(10)).await,
        "leader never became Ready"
    );

    let shared = hub.room_anchor_names(config.room_id);
    assert_eq!(shared.len(), 1, "leader should have uploaded exactly one anchor");

    // Joiner arrives later, joins the existing room, downloads and adopts
    joiner.session.connect_manager();
    joiner.session.join();
    assert!(
        wait_for_state(&joiner_handle, AnchorState::Ready, Duration::from_secs(10)).await,
        "joiner never became Ready"
    );

    let status = joiner_handle.status().await.unwrap();
    assert!(status.flags.anchor_configured);
    assert!(!status.flags.local_anchor, "joiner adopted a remote anchor");
    assert_eq!(status.room.unwrap().name, "ShareRoom");

    leader_handle.shutdown().await.unwrap();
    joiner_handle.shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), leader_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), joiner_task).await;
}

#[tokio::test]
async fn test_placement_restart_republishes_and_peers_follow() {
    let hub = SharingHub::new();
    let config = fast_config();

    let leader = SimParticipant::new(&hub, 1);
    let joiner = SimParticipant::new(&hub, 9);

    let (leader_handle, leader_task) = spawn_coordinator(&leader, config.clone());
    let (joiner_handle, joiner_task) = spawn_coordinator(&joiner, config.clone());

    leader.session.connect_manager();
    leader.session.join();
    assert!(wait_for_state(&leader_handle, AnchorState::Ready, Duration::from_secs(10)).await);

    joiner.session.connect_manager();
    joiner.session.join();
    assert!(wait_for_state(&joiner_handle, AnchorState::Ready, Duration::from_secs(10)).await);

    // Both sides are quiescent; re-confirm the leader settled after its
    // own room-changed reset before driving placement
    assert!(wait_for_state(&leader_handle, AnchorState::Ready, Duration::from_secs(10)).await);

    // The leader re-places the shared object
    assert!(leader_handle.is_placement_allowed().await.unwrap());
    leader_handle.request_placement_start().await.unwrap();
    assert!(
        wait_for_state(&leader_handle, AnchorState::AnchorPlacement, Duration::from_secs(5)).await,
        "placement never started"
    );
    assert!(!leader_handle.is_placement_allowed().await.unwrap());

    leader_handle.request_placement_end().await.unwrap();

    // A fresh anchor is minted and published; everyone settles again
    assert!(
        wait_for_state(&leader_handle, AnchorState::Ready, Duration::from_secs(10)).await,
        "leader never re-anchored"
    );
    assert!(
        wait_for_state(&joiner_handle, AnchorState::Ready, Duration::from_secs(10)).await,
        "joiner never re-adopted"
    );

    let names = hub.room_anchor_names(config.room_id);
    assert_eq!(names.len(), 2, "re-anchoring uploads a second slot");

    let joiner_status = joiner_handle.status().await.unwrap();
    assert!(joiner_status.flags.anchor_configured);
    assert!(!joiner_status.flags.local_anchor);

    leader_handle.shutdown().await.unwrap();
    joiner_handle.shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), leader_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), joiner_task).await;
}
