//! Pilot operations: registration and landing.

use tracing::info;

use crate::{
    dao::models::{ParticipantRecord, ParticipantStatus},
    error::ServiceError,
    state::{SharedNode, clock::millis_between},
};

/// Register a new participant under `display_name`.
///
/// Open to every role: teams register themselves from their own client, and
/// the director registers walk-ups from the control desk.
pub async fn register_participant(
    node: &SharedNode,
    display_name: &str,
) -> Result<ParticipantRecord, ServiceError> {
    let name = display_name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("display name is empty".into()));
    }
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let record = ParticipantRecord::register(name.to_owned(), node.clock().authoritative_now());
    store.upsert_participant(record.clone()).await?;
    info!(participant = %record.id, name = %record.display_name, "participant registered");
    Ok(record)
}

/// This pilot's own record.
pub async fn own_record(node: &SharedNode) -> Result<ParticipantRecord, ServiceError> {
    let participant_id = node
        .role()
        .participant_id()
        .ok_or_else(|| ServiceError::WrongRole("pilot operations".into()))?;
    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    store
        .read_participant(participant_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("participant {participant_id}")))
}

/// Record this pilot's landing at the current authoritative instant.
///
/// The landing freezes the flight clock: the duration is derived once, here,
/// and later clock-offset corrections never rewrite it.
pub async fn record_landing(node: &SharedNode) -> Result<ParticipantRecord, ServiceError> {
    let mut record = own_record(node).await?;
    if record.status != ParticipantStatus::Flying {
        return Err(ServiceError::InvalidState(format!(
            "cannot land from status {:?}",
            record.status
        )));
    }
    let flight_start = record.flight_start.ok_or_else(|| {
        ServiceError::InvalidState("flying participant has no flight start".into())
    })?;

    let now = node.clock().authoritative_now();
    let duration_seconds = (millis_between(flight_start, now) / 1_000).max(0);
    record.status = ParticipantStatus::Landed;
    record.flight_duration_seconds = Some(duration_seconds);
    record.land_time = Some(flight_start + std::time::Duration::from_secs(duration_seconds as u64));

    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    store.upsert_participant(record.clone()).await?;
    info!(
        participant = %record.id,
        duration_seconds,
        "landing recorded"
    );
    Ok(record)
}
