//! Director operations: the only writers of the mission timeline.

use tracing::info;

use crate::{
    dao::{
        mission_store::MISSION_SINGLETON,
        models::{
            LandingGrade, MissionPhase, MissionRecord, ParticipantStatus, WinnerAnnouncement,
            WinnerSummary,
        },
    },
    error::ServiceError,
    services::scoring::{self, FinalScore},
    state::{SharedNode, state_machine::PhaseEvent},
};

/// Ensure the mission singleton exists, writing the lobby record on first run.
pub async fn bootstrap(node: &SharedNode) -> Result<(), ServiceError> {
    require_director(node)?;
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    if store.read_mission(MISSION_SINGLETON).await?.is_none() {
        store
            .write_mission(MISSION_SINGLETON, MissionRecord::idle())
            .await?;
        info!("mission record bootstrapped");
    }
    Ok(())
}

/// How a phase request was carried out.
#[derive(Debug, Clone)]
pub enum PhaseRequest {
    /// Transition applied immediately; the new record.
    Forced(MissionRecord),
    /// Launch session opened; the phase starts once the session commits.
    Synced(uuid::Uuid),
}

/// Request a phase change, synchronized or immediate.
///
/// Synchronized requests open a launch session and return its id; the phase
/// only changes after [`crate::services::launch::commit_launch`] and the
/// countdown. Immediate requests apply the transition now.
pub async fn request_phase(
    node: &SharedNode,
    target: MissionPhase,
    synced: bool,
) -> Result<PhaseRequest, ServiceError> {
    if synced {
        let session_id = crate::services::launch::open_launch(node, target).await?;
        Ok(PhaseRequest::Synced(session_id))
    } else {
        force_phase(node, target).await.map(PhaseRequest::Forced)
    }
}

/// Immediately move the timeline to `target`, without a countdown.
///
/// The unsynchronized escape hatch next to the launch coordinator; the same
/// transition rules apply.
pub async fn force_phase(
    node: &SharedNode,
    target: MissionPhase,
) -> Result<MissionRecord, ServiceError> {
    require_director(node)?;
    apply_phase_event(node, PhaseEvent::for_target(target)).await
}

/// Apply a phase event, persist the new record, and carry every participant
/// along with the phase.
///
/// Entering BUILD puts waiting teams to work; entering FLIGHT stamps the
/// shared flight start on every airborne team; returning to IDLE freezes
/// statuses as they are so results survive a stop.
pub(crate) async fn apply_phase_event(
    node: &SharedNode,
    event: PhaseEvent,
) -> Result<MissionRecord, ServiceError> {
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let now = node.clock().authoritative_now();
    let record = node.timeline().write().await.transition(event, now)?;
    store.write_mission(MISSION_SINGLETON, record.clone()).await?;
    info!(phase = ?record.phase, "mission phase changed");

    for mut participant in store.list_participants().await? {
        let mut reconciled = participant.status.reconciled_with(record.phase);
        // The clamp only repairs contradictions; the bulk move into the
        // workshop is the director's doing.
        if record.phase == MissionPhase::Build && reconciled == ParticipantStatus::Waiting {
            reconciled = ParticipantStatus::Building;
        }
        let stamp_start = record.phase == MissionPhase::Flight
            && reconciled == ParticipantStatus::Flying
            && participant.flight_start.is_none();
        if reconciled == participant.status && !stamp_start {
            continue;
        }
        participant.status = reconciled;
        if stamp_start {
            participant.flight_start = Some(now);
        }
        store.upsert_participant(participant).await?;
    }
    Ok(record)
}

/// Reset every participant for a fresh heat and clear any winner announcement.
///
/// Only legal from the lobby; identities and registration order are kept.
pub async fn new_heat(node: &SharedNode) -> Result<(), ServiceError> {
    require_director(node)?;
    let store = node.store().await.ok_or(ServiceError::Degraded)?;

    let record = node.timeline().read().await.record().clone();
    if record.phase != MissionPhase::Idle {
        return Err(ServiceError::InvalidState(
            "a new heat can only start from the lobby".into(),
        ));
    }
    if record.winner_announcement.is_some() {
        let mut cleared = record;
        cleared.winner_announcement = None;
        store.write_mission(MISSION_SINGLETON, cleared.clone()).await?;
        node.timeline().write().await.reconcile(cleared);
    }

    for mut participant in store.list_participants().await? {
        participant.reset_for_new_heat();
        store.upsert_participant(participant).await?;
    }
    info!("participants reset for a new heat");
    Ok(())
}

/// Lock the ranking and announce the winner, starting the reveal hold.
///
/// Refused until every team has landed or been disqualified; the head of the
/// ranking must be an actually scored participant.
pub async fn announce_winner(node: &SharedNode) -> Result<WinnerAnnouncement, ServiceError> {
    require_director(node)?;
    let store = node.store().await.ok_or(ServiceError::Degraded)?;

    let participants = store.list_participants().await?;
    if participants.is_empty() {
        return Err(ServiceError::InvalidState("no participants registered".into()));
    }
    if participants.iter().any(|p| {
        p.status != ParticipantStatus::Landed
            && p.scoring.landing_grade != LandingGrade::Disqualified
    }) {
        return Err(ServiceError::InvalidState(
            "every team must be landed or disqualified before the announcement".into(),
        ));
    }

    let board = scoring::rank_participants(&participants, node.config());
    let head = board
        .iter()
        .find(|entry| matches!(entry.final_score, FinalScore::Scored(_)))
        .ok_or_else(|| ServiceError::InvalidState("no scored participant to announce".into()))?;

    let announcement = WinnerAnnouncement {
        announced_at: node.clock().authoritative_now(),
        winner: WinnerSummary {
            participant_id: head.participant_id,
            display_name: head.display_name.clone(),
        },
    };
    let mut record = node.timeline().read().await.record().clone();
    record.winner_announcement = Some(announcement.clone());
    store.write_mission(MISSION_SINGLETON, record.clone()).await?;
    node.timeline().write().await.reconcile(record);

    info!(winner = %announcement.winner.display_name, "winner announced");
    Ok(announcement)
}

fn require_director(node: &SharedNode) -> Result<(), ServiceError> {
    if node.role().is_director() {
        Ok(())
    } else {
        Err(ServiceError::WrongRole("mission direction".into()))
    }
}
