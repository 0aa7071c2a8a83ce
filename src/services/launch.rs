//! Synchronized-launch coordinator.
//!
//! The director opens a session and probes once a second; each pilot answers
//! with its measured clock offset; the commit closes the session, hands every
//! pilot its offset, and schedules the phase start a fixed lead ahead so all
//! clients flip at the same authoritative instant.

use indexmap::IndexMap;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    bus::BusError,
    dao::{
        mission_store::MISSION_SINGLETON,
        models::{MissionPhase, PendingLaunch},
    },
    dto::sync::{SyncCommit, SyncProbe, SyncResponse},
    error::ServiceError,
    services::{director, sync_events},
    state::{
        SharedNode,
        clock::{OffsetSource, epoch_ms},
        state_machine::{PhaseEvent, compute_transition},
    },
};

/// Director-side record of an open launch session.
#[derive(Debug, Clone)]
pub struct LaunchSession {
    /// Opaque session identity carried by every protocol message.
    pub id: Uuid,
    /// Phase the session will start.
    pub target: MissionPhase,
    /// When the session was opened, director clock.
    pub opened_at: OffsetDateTime,
    /// Responses received so far, keyed by participant.
    pub responses: IndexMap<Uuid, SyncResponse>,
}

/// Result of a commit attempt.
#[derive(Debug, Clone)]
pub enum LaunchOutcome {
    /// Commit published and the countdown persisted.
    Committed(SyncCommit),
    /// Not everyone has responded; nothing was changed.
    Waiting {
        /// Participants that have responded.
        ready: usize,
        /// Participants expected to respond.
        total: usize,
    },
}

/// Open a launch session for `target` and send the first probe.
///
/// Director only. The target must be reachable from the current phase, so an
/// illegal launch is rejected before any probe goes out.
pub async fn open_launch(node: &SharedNode, target: MissionPhase) -> Result<Uuid, ServiceError> {
    require_director(node)?;
    let current = node.timeline().read().await.phase();
    compute_transition(current, PhaseEvent::for_target(target))?;

    let session = LaunchSession {
        id: Uuid::new_v4(),
        target,
        opened_at: node.clock().authoritative_now(),
        responses: IndexMap::new(),
    };
    let session_id = session.id;
    {
        let mut slot = node.launch_slot().lock().await;
        if slot.is_some() {
            return Err(ServiceError::InvalidState(
                "a launch session is already open".into(),
            ));
        }
        *slot = Some(session);
    }
    info!(%session_id, phase = ?target, "launch session opened");
    send_probe(node).await?;
    Ok(session_id)
}

/// Send one probe for the open session. No-op when no session is open.
pub async fn send_probe(node: &SharedNode) -> Result<(), ServiceError> {
    require_director(node)?;
    let probe = {
        let slot = node.launch_slot().lock().await;
        let Some(session) = slot.as_ref() else {
            return Ok(());
        };
        SyncProbe {
            session_id: session.id,
            phase: session.target,
            director_epoch_ms: epoch_ms(OffsetDateTime::now_utc()),
        }
    };
    let Some(bus) = node.bus().await else {
        return Err(ServiceError::BusUnavailable(BusError::Unavailable(
            "no broadcast channel installed".into(),
        )));
    };
    sync_events::publish_probe(&bus, &probe).await;
    Ok(())
}

/// Director side: fold a pilot's response into the open session.
///
/// Responses for a closed or different session are ignored; the pilot will be
/// re-probed if the session is still alive.
pub async fn record_sync_response(node: &SharedNode, response: SyncResponse) {
    let mut slot = node.launch_slot().lock().await;
    match slot.as_mut() {
        Some(session) if session.id == response.session_id => {
            debug!(
                participant = %response.participant_id,
                offset_ms = response.offset_ms,
                "sync response recorded"
            );
            session.responses.insert(response.participant_id, response);
        }
        _ => {
            debug!(session = %response.session_id, "dropping response for unknown session");
        }
    }
}

/// How many expected participants have responded to the open session.
pub async fn readiness(node: &SharedNode) -> Result<Option<(usize, usize)>, ServiceError> {
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let total = store.list_participants().await?.len();
    let slot = node.launch_slot().lock().await;
    Ok(slot.as_ref().map(|session| (session.responses.len(), total)))
}

/// Commit the open launch session.
///
/// With `force` unset the commit only proceeds once every registered
/// participant has responded; otherwise the call reports readiness and leaves
/// the session open. A commit broadcasts the per-participant offsets, writes
/// the countdown into the store, and closes the session.
pub async fn commit_launch(node: &SharedNode, force: bool) -> Result<LaunchOutcome, ServiceError> {
    require_director(node)?;
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let participants = store.list_participants().await?;

    let session = {
        let mut slot = node.launch_slot().lock().await;
        let Some(session) = slot.take() else {
            return Err(ServiceError::InvalidState("no launch session open".into()));
        };
        if !force && session.responses.len() < participants.len() {
            let ready = session.responses.len();
            *slot = Some(session);
            return Ok(LaunchOutcome::Waiting {
                ready,
                total: participants.len(),
            });
        }
        session
    };

    let now = node.clock().authoritative_now();
    let commit = SyncCommit {
        session_id: session.id,
        phase: session.target,
        offsets_by_participant: session
            .responses
            .iter()
            .map(|(id, response)| (*id, response.offset_ms))
            .collect(),
        committed_at: now,
    };
    if let Some(bus) = node.bus().await {
        sync_events::publish_commit(&bus, &commit).await;
    }

    let mut record = node.timeline().read().await.record().clone();
    record.pending_launch = Some(PendingLaunch {
        ends_at: now + node.config().countdown_lead,
        label: session.target,
    });
    store.write_mission(MISSION_SINGLETON, record.clone()).await?;
    node.timeline().write().await.reconcile(record);

    info!(
        session = %commit.session_id,
        phase = ?commit.phase,
        responded = commit.offsets_by_participant.len(),
        forced = force,
        "launch committed"
    );
    Ok(LaunchOutcome::Committed(commit))
}

/// Abort the open session and clear any persisted countdown.
pub async fn abort_launch(node: &SharedNode) -> Result<(), ServiceError> {
    require_director(node)?;
    let aborted = node.launch_slot().lock().await.take();
    if let Some(session) = aborted {
        info!(session = %session.id, "launch session aborted");
    }

    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let mut record = node.timeline().read().await.record().clone();
    if record.pending_launch.take().is_some() {
        store.write_mission(MISSION_SINGLETON, record.clone()).await?;
        node.timeline().write().await.reconcile(record);
    }
    Ok(())
}

/// Fire the persisted countdown if it has expired.
///
/// Director only; called from the timer loops. Returns whether the phase
/// transition was applied.
pub async fn complete_due_launch(node: &SharedNode) -> Result<bool, ServiceError> {
    if !node.role().is_director() {
        return Ok(false);
    }
    let pending = node.timeline().read().await.record().pending_launch.clone();
    let Some(pending) = pending else {
        return Ok(false);
    };
    if node.clock().authoritative_now() < pending.ends_at {
        return Ok(false);
    }
    info!(phase = ?pending.label, "launch countdown expired; starting phase");
    director::apply_phase_event(node, PhaseEvent::for_target(pending.label)).await?;
    Ok(true)
}

/// Director probe loop: one probe per interval while a session is open.
///
/// Runs until the task is cancelled; idles when no session is open.
pub async fn run_probe_loop(node: SharedNode) {
    let mut ticker = tokio::time::interval(node.config().probe_interval);
    loop {
        ticker.tick().await;
        if node.launch_slot().lock().await.is_none() {
            continue;
        }
        if let Err(err) = send_probe(&node).await {
            tracing::warn!(error = %err, "launch probe failed");
        }
    }
}

/// Pilot side: answer a probe with this client's clock sample.
///
/// The locally measured offset is remembered per session as the fallback in
/// case the commit omits this participant. Non-pilot roles stay silent.
pub async fn handle_probe(node: &SharedNode, probe: &SyncProbe) -> Option<SyncResponse> {
    let participant_id = node.role().participant_id()?;
    let local_now = OffsetDateTime::now_utc();
    let client_epoch_ms = epoch_ms(local_now);
    let offset_ms = probe.director_epoch_ms - client_epoch_ms;
    node.probe_offsets().insert(probe.session_id, offset_ms);

    let display_name = match node.store().await {
        Some(store) => store
            .read_participant(participant_id)
            .await
            .ok()
            .flatten()
            .map(|record| record.display_name)
            .unwrap_or_default(),
        None => String::new(),
    };
    let response = SyncResponse {
        session_id: probe.session_id,
        phase: probe.phase,
        participant_id,
        display_name,
        client_epoch_ms,
        offset_ms,
        responded_at: local_now,
    };
    if let Some(bus) = node.bus().await {
        sync_events::publish_response(&bus, &response).await;
    }
    Some(response)
}

/// Client side: absorb a commit's clock offset.
///
/// The committed offset for this participant wins; a client the commit omits
/// falls back to the offset it measured from the probes. A commit for a
/// session this client never saw is ignored. Returns the applied offset.
pub fn handle_commit(node: &SharedNode, commit: &SyncCommit) -> Option<i64> {
    let own_offset = node
        .role()
        .participant_id()
        .and_then(|id| commit.offsets_by_participant.get(&id).copied());
    let fallback = node
        .probe_offsets()
        .get(&commit.session_id)
        .map(|entry| *entry.value());
    let Some(offset_ms) = own_offset.or(fallback) else {
        debug!(session = %commit.session_id, "ignoring commit for unknown session");
        return None;
    };
    node.probe_offsets().remove(&commit.session_id);
    node.clock().apply_offset(offset_ms, OffsetSource::BroadcastCommit);
    Some(offset_ms)
}

fn require_director(node: &SharedNode) -> Result<(), ServiceError> {
    if node.role().is_director() {
        Ok(())
    } else {
        Err(ServiceError::WrongRole("launch control".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{BroadcastChannel, MemoryBus},
        config::MissionConfig,
        dao::{memory::MemoryMissionStore, mission_store::MissionStore, models::ParticipantRecord},
        state::{MissionNode, Role},
    };
    use std::{sync::Arc, time::Duration};

    async fn director_node(config: MissionConfig) -> (SharedNode, Arc<MemoryMissionStore>) {
        let store = Arc::new(MemoryMissionStore::new());
        let node = MissionNode::new(Role::Director, config);
        node.install_store(store.clone()).await;
        node.install_bus(Arc::new(MemoryBus::new())).await;
        (node, store)
    }

    async fn register(store: &MemoryMissionStore, name: &str) -> ParticipantRecord {
        let record = ParticipantRecord::register(name.into(), OffsetDateTime::now_utc());
        store.upsert_participant(record.clone()).await.unwrap();
        record
    }

    #[tokio::test]
    async fn commit_waits_until_everyone_responds_unless_forced() {
        let (node, store) = director_node(MissionConfig::default()).await;
        let alpha = register(&store, "alpha").await;
        let _beta = register(&store, "beta").await;

        let session_id = open_launch(&node, MissionPhase::Build).await.unwrap();

        record_sync_response(
            &node,
            SyncResponse {
                session_id,
                phase: MissionPhase::Build,
                participant_id: alpha.id,
                display_name: alpha.display_name.clone(),
                client_epoch_ms: 0,
                offset_ms: -250,
                responded_at: OffsetDateTime::now_utc(),
            },
        )
        .await;

        match commit_launch(&node, false).await.unwrap() {
            LaunchOutcome::Waiting { ready, total } => {
                assert_eq!((ready, total), (1, 2));
            }
            other => panic!("expected waiting, got {other:?}"),
        }
        // The no-op left the session open.
        assert!(node.launch_slot().lock().await.is_some());

        match commit_launch(&node, true).await.unwrap() {
            LaunchOutcome::Committed(commit) => {
                assert_eq!(commit.offsets_by_participant.len(), 1);
                assert_eq!(commit.offsets_by_participant[&alpha.id], -250);
            }
            other => panic!("expected commit, got {other:?}"),
        }
        assert!(node.launch_slot().lock().await.is_none());

        let record = store
            .read_mission(MISSION_SINGLETON)
            .await
            .unwrap()
            .unwrap_or_default();
        let pending = record.pending_launch.expect("countdown persisted");
        assert_eq!(pending.label, MissionPhase::Build);
    }

    #[tokio::test]
    async fn due_countdown_starts_the_phase() {
        let config = MissionConfig {
            countdown_lead: Duration::ZERO,
            ..MissionConfig::default()
        };
        let (node, store) = director_node(config).await;
        register(&store, "solo").await;

        open_launch(&node, MissionPhase::Build).await.unwrap();
        commit_launch(&node, true).await.unwrap();

        assert!(complete_due_launch(&node).await.unwrap());
        let record = node.mission_record().await;
        assert_eq!(record.phase, MissionPhase::Build);
        assert!(record.pending_launch.is_none());

        // Nothing left to fire.
        assert!(!complete_due_launch(&node).await.unwrap());
    }

    #[tokio::test]
    async fn stale_session_responses_are_dropped() {
        let (node, store) = director_node(MissionConfig::default()).await;
        let alpha = register(&store, "alpha").await;

        let _session_id = open_launch(&node, MissionPhase::Build).await.unwrap();
        record_sync_response(
            &node,
            SyncResponse {
                session_id: Uuid::new_v4(), // not the open session
                phase: MissionPhase::Build,
                participant_id: alpha.id,
                display_name: alpha.display_name.clone(),
                client_epoch_ms: 0,
                offset_ms: 0,
                responded_at: OffsetDateTime::now_utc(),
            },
        )
        .await;

        assert_eq!(readiness(&node).await.unwrap(), Some((0, 1)));
    }

    #[tokio::test]
    async fn pilot_answers_probe_and_absorbs_commit_offset() {
        let store = Arc::new(MemoryMissionStore::new());
        let pilot = register(&store, "gemini").await;
        let node = MissionNode::new(Role::Pilot(pilot.id), MissionConfig::default());
        node.install_store(store).await;
        let bus = Arc::new(MemoryBus::new());
        node.install_bus(bus.clone()).await;
        let mut rx = bus.subscribe(crate::bus::LAUNCH_SYNC_TOPIC);

        // Director clock 10s ahead of this pilot.
        let session_id = Uuid::new_v4();
        let probe = SyncProbe {
            session_id,
            phase: MissionPhase::Flight,
            director_epoch_ms: epoch_ms(OffsetDateTime::now_utc()) + 10_000,
        };
        let response = handle_probe(&node, &probe).await.expect("pilot responds");
        assert!((9_900..=10_100).contains(&response.offset_ms));
        assert_eq!(response.display_name, "gemini");
        assert_eq!(rx.recv().await.unwrap().event, sync_events::EVENT_SYNC_RESPONSE);

        let mut offsets = IndexMap::new();
        offsets.insert(pilot.id, 10_000_i64);
        let commit = SyncCommit {
            session_id,
            phase: MissionPhase::Flight,
            offsets_by_participant: offsets,
            committed_at: OffsetDateTime::now_utc(),
        };
        assert_eq!(handle_commit(&node, &commit), Some(10_000));
        assert_eq!(node.clock().offset_millis(), 10_000);
        assert_eq!(node.clock().source(), OffsetSource::BroadcastCommit);
    }

    #[tokio::test]
    async fn duplicate_probes_and_commits_are_idempotent() {
        let node = MissionNode::new(Role::Pilot(Uuid::new_v4()), MissionConfig::default());
        let session_id = Uuid::new_v4();
        let probe = SyncProbe {
            session_id,
            phase: MissionPhase::Build,
            director_epoch_ms: epoch_ms(OffsetDateTime::now_utc()) - 5_000,
        };
        handle_probe(&node, &probe).await.unwrap();
        handle_probe(&node, &probe).await.unwrap();
        assert_eq!(node.probe_offsets().len(), 1);

        let commit = SyncCommit {
            session_id,
            phase: MissionPhase::Build,
            offsets_by_participant: IndexMap::new(),
            committed_at: OffsetDateTime::now_utc(),
        };
        let first = handle_commit(&node, &commit).expect("fallback offset applies");
        // Replaying the commit finds the same offset in the commit or nothing
        // at all; the clock never moves a second time.
        let offset_after = node.clock().offset_millis();
        handle_commit(&node, &commit);
        assert_eq!(node.clock().offset_millis(), offset_after);
        assert!((-5_100..=-4_900).contains(&first));
    }

    #[tokio::test]
    async fn commit_for_unknown_session_is_ignored() {
        let node = MissionNode::new(Role::Pilot(Uuid::new_v4()), MissionConfig::default());
        let commit = SyncCommit {
            session_id: Uuid::new_v4(),
            phase: MissionPhase::Build,
            offsets_by_participant: IndexMap::new(),
            committed_at: OffsetDateTime::now_utc(),
        };
        assert_eq!(handle_commit(&node, &commit), None);
        assert_eq!(node.clock().offset_millis(), 0);
        assert_eq!(node.clock().source(), OffsetSource::Local);
    }

    #[tokio::test]
    async fn spectators_never_answer_probes() {
        let node = MissionNode::new(Role::Spectator, MissionConfig::default());
        let probe = SyncProbe {
            session_id: Uuid::new_v4(),
            phase: MissionPhase::Build,
            director_epoch_ms: epoch_ms(OffsetDateTime::now_utc()),
        };
        assert!(handle_probe(&node, &probe).await.is_none());
    }

    #[tokio::test]
    async fn probes_need_a_broadcast_channel() {
        let store = Arc::new(MemoryMissionStore::new());
        let node = MissionNode::new(Role::Director, MissionConfig::default());
        node.install_store(store).await;

        let err = open_launch(&node, MissionPhase::Build).await.unwrap_err();
        assert!(matches!(err, ServiceError::BusUnavailable(_)));
    }

    #[tokio::test]
    async fn only_the_director_opens_sessions() {
        let node = MissionNode::new(Role::Judge, MissionConfig::default());
        let err = open_launch(&node, MissionPhase::Build).await.unwrap_err();
        assert!(matches!(err, ServiceError::WrongRole(_)));
    }

    #[tokio::test]
    async fn launch_to_an_unreachable_phase_is_rejected() {
        let (node, _store) = director_node(MissionConfig::default()).await;
        // FLIGHT cannot be launched from the lobby.
        let err = open_launch(&node, MissionPhase::Flight).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
