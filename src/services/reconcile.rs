//! Reconciliation: folding the store's truth into the local node.
//!
//! Two independent triggers feed the same idempotent function: a fixed
//! interval poll and the store's change notifications. Either alone keeps a
//! client correct; both together never double-apply anything.

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    bus::LAUNCH_SYNC_TOPIC,
    dao::{mission_store::MISSION_SINGLETON, models::MissionRecord},
    error::ServiceError,
    services::{launch, sync_events},
    state::{SharedNode, display::derive_display},
};

/// Pull the mission record from the store and fold it into the local node.
pub async fn reconcile(node: &SharedNode) -> Result<(), ServiceError> {
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let fresh = store
        .read_mission(MISSION_SINGLETON)
        .await?
        .unwrap_or_default();
    apply_fresh_record(node, fresh).await;
    Ok(())
}

/// Fold a freshly read mission record into the local view.
///
/// Before the record replaces the local view, the differences against the
/// previous view drive the passive clock corrections: a countdown appearing
/// too far from its expected lead, or a phase start already carrying a large
/// elapsed residual. The engine itself refuses corrections on the authority
/// and under a commit-sourced offset.
pub(crate) async fn apply_fresh_record(node: &SharedNode, fresh: MissionRecord) {
    let previous = node.mission_record().await;

    if let Some(pending) = &fresh.pending_launch
        && previous.pending_launch.as_ref() != Some(pending)
    {
        node.clock()
            .observe_pending_launch(pending.ends_at, node.config());
    }
    if fresh.phase != previous.phase
        && let Some(started_at) = fresh.phase_started_at
    {
        node.clock().observe_phase_start(started_at, node.config());
    }

    let fresh_phase = fresh.phase;
    let phase_changed = node.timeline().write().await.reconcile(fresh);
    if phase_changed {
        debug!(phase = ?fresh_phase, "phase reconciled from store");
    }
    refresh_display(node).await;
}

/// Re-derive the display from the local view and the authoritative clock.
pub async fn refresh_display(node: &SharedNode) {
    let record = node.mission_record().await;
    let display = derive_display(&record, node.clock().authoritative_now(), node.config());
    node.push_display(display);
}

/// Fixed-interval poll backstop. Runs until the task is cancelled.
///
/// On the director this is also the timer that fires due launch countdowns.
pub async fn run_poll_loop(node: SharedNode) {
    let mut ticker = tokio::time::interval(node.config().poll_interval);
    loop {
        ticker.tick().await;
        match reconcile(&node).await {
            Ok(()) | Err(ServiceError::Degraded) => {}
            Err(err) => warn!(error = %err, "poll reconcile failed"),
        }
        if node.role().is_director()
            && let Err(err) = launch::complete_due_launch(&node).await
        {
            warn!(error = %err, "due launch completion failed");
        }
    }
}

/// Push trigger: reconcile on every store change notification.
///
/// Dropped notifications are harmless; a lagged receiver just reconciles once
/// for the whole gap and the poll loop backstops the rest.
pub async fn run_change_listener(node: SharedNode) {
    let Some(store) = node.store().await else {
        return;
    };
    let mut changes = store.changes();
    loop {
        match changes.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {
                match reconcile(&node).await {
                    Ok(()) | Err(ServiceError::Degraded) => {}
                    Err(err) => warn!(error = %err, "change-triggered reconcile failed"),
                }
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Display tick: keeps the clock text advancing between reconciles.
pub async fn run_display_ticker(node: SharedNode) {
    let mut ticker = tokio::time::interval(node.config().display_tick);
    loop {
        ticker.tick().await;
        refresh_display(&node).await;
    }
}

/// Dispatch launch-sync traffic to the role that handles it.
pub async fn run_bus_listener(node: SharedNode) {
    let Some(bus) = node.bus().await else {
        return;
    };
    let mut messages = bus.subscribe(LAUNCH_SYNC_TOPIC);
    loop {
        let envelope = match messages.recv().await {
            Ok(envelope) => envelope,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "launch-sync listener lagged; messages dropped");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        match envelope.event.as_str() {
            sync_events::EVENT_SYNC_REQUEST => {
                match serde_json::from_value(envelope.payload) {
                    Ok(probe) => {
                        launch::handle_probe(&node, &probe).await;
                    }
                    Err(err) => warn!(error = %err, "malformed sync probe"),
                }
            }
            sync_events::EVENT_SYNC_RESPONSE if node.role().is_director() => {
                match serde_json::from_value(envelope.payload) {
                    Ok(response) => launch::record_sync_response(&node, response).await,
                    Err(err) => warn!(error = %err, "malformed sync response"),
                }
            }
            sync_events::EVENT_SYNC_COMMIT if !node.role().is_director() => {
                match serde_json::from_value(envelope.payload) {
                    Ok(commit) => {
                        launch::handle_commit(&node, &commit);
                    }
                    Err(err) => warn!(error = %err, "malformed sync commit"),
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::MemoryBus,
        config::MissionConfig,
        dao::{
            memory::MemoryMissionStore,
            mission_store::MissionStore,
            models::{MissionPhase, ParticipantRecord, PendingLaunch},
        },
        services::launch::LaunchOutcome,
        state::{MissionNode, OffsetSource, Role},
    };
    use std::{sync::Arc, time::Duration};
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn pilot_node(store: Arc<MemoryMissionStore>) -> SharedNode {
        let node = MissionNode::new(Role::Pilot(Uuid::new_v4()), MissionConfig::default());
        node.install_store(store).await;
        node
    }

    #[tokio::test]
    async fn appearing_countdown_nudges_a_drifting_clock() {
        let store = Arc::new(MemoryMissionStore::new());
        let node = pilot_node(store.clone()).await;

        // Countdown ending 20s out where the lead should be 3s: this client
        // is running ~17s behind the director.
        let record = MissionRecord {
            pending_launch: Some(PendingLaunch {
                ends_at: OffsetDateTime::now_utc() + Duration::from_secs(20),
                label: MissionPhase::Build,
            }),
            ..MissionRecord::idle()
        };
        store.write_mission(MISSION_SINGLETON, record).await.unwrap();

        reconcile(&node).await.unwrap();
        assert!((16_500..=17_500).contains(&node.clock().offset_millis()));
        assert_eq!(node.clock().source(), OffsetSource::PollInferred);

        // The same record again is a no-op: both triggers may fire for one
        // write without double-applying the correction.
        let offset = node.clock().offset_millis();
        reconcile(&node).await.unwrap();
        assert_eq!(node.clock().offset_millis(), offset);
    }

    #[tokio::test]
    async fn phase_start_with_large_residual_snaps_the_clock() {
        let store = Arc::new(MemoryMissionStore::new());
        let node = pilot_node(store.clone()).await;

        let record = MissionRecord {
            phase: MissionPhase::Build,
            phase_started_at: Some(OffsetDateTime::now_utc() - Duration::from_secs(10)),
            ..MissionRecord::idle()
        };
        store.write_mission(MISSION_SINGLETON, record).await.unwrap();

        reconcile(&node).await.unwrap();
        assert!((-10_500..=-9_500).contains(&node.clock().offset_millis()));
        assert_eq!(node.mission_record().await.phase, MissionPhase::Build);
    }

    #[tokio::test]
    async fn reconcile_updates_the_display() {
        let store = Arc::new(MemoryMissionStore::new());
        let node = pilot_node(store.clone()).await;

        let record = MissionRecord {
            phase: MissionPhase::Flight,
            phase_started_at: Some(OffsetDateTime::now_utc() - Duration::from_secs(65)),
            ..MissionRecord::idle()
        };
        store.write_mission(MISSION_SINGLETON, record).await.unwrap();

        reconcile(&node).await.unwrap();
        // A late joiner sees a 65s residual on the phase start: the snap
        // corrects the clock (clamped at the offset bound), so the displayed
        // elapsed time is what the corrected clock measures.
        assert_eq!(node.clock().offset_millis(), -60_000);
        let display = node.current_display();
        assert_eq!(display.phase, MissionPhase::Flight);
        assert_eq!(display.clock, "00:05");
    }

    #[tokio::test]
    async fn commit_sourced_offset_survives_reconcile() {
        let store = Arc::new(MemoryMissionStore::new());
        let node = pilot_node(store.clone()).await;
        node.clock().apply_offset(-2_000, OffsetSource::BroadcastCommit);

        let record = MissionRecord {
            pending_launch: Some(PendingLaunch {
                ends_at: OffsetDateTime::now_utc() + Duration::from_secs(30),
                label: MissionPhase::Flight,
            }),
            phase: MissionPhase::Build,
            phase_started_at: Some(OffsetDateTime::now_utc() - Duration::from_secs(30)),
            ..MissionRecord::idle()
        };
        store.write_mission(MISSION_SINGLETON, record).await.unwrap();

        reconcile(&node).await.unwrap();
        assert_eq!(node.clock().offset_millis(), -2_000);
        assert_eq!(node.clock().source(), OffsetSource::BroadcastCommit);
    }

    #[tokio::test]
    async fn bus_listener_carries_the_protocol_end_to_end() {
        let store = Arc::new(MemoryMissionStore::new());
        let bus = Arc::new(MemoryBus::new());

        let pilot_record =
            ParticipantRecord::register("Falcon".into(), OffsetDateTime::now_utc());
        store.upsert_participant(pilot_record.clone()).await.unwrap();

        let director = MissionNode::new(Role::Director, MissionConfig::default());
        director.install_store(store.clone()).await;
        director.install_bus(bus.clone()).await;

        let pilot = MissionNode::new(Role::Pilot(pilot_record.id), MissionConfig::default());
        pilot.install_store(store.clone()).await;
        pilot.install_bus(bus.clone()).await;

        let director_listener = tokio::spawn(run_bus_listener(director.clone()));
        let pilot_listener = tokio::spawn(run_bus_listener(pilot.clone()));
        // Listeners must be subscribed before the first probe goes out.
        tokio::time::sleep(Duration::from_millis(20)).await;

        launch::open_launch(&director, MissionPhase::Build)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            launch::readiness(&director).await.unwrap(),
            Some((1, 1)),
            "pilot response should reach the director"
        );

        let outcome = launch::commit_launch(&director, false).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Committed(_)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pilot.clock().source(), OffsetSource::BroadcastCommit);

        director_listener.abort();
        pilot_listener.abort();
    }
}
