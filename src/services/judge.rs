//! Judge operations: scoring input edits.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{LandingGrade, ParticipantRecord, ScoringInputs},
    dto::{judge::ScoringPatch, validation::validate_scoring_patch},
    error::ServiceError,
    state::{Role, SharedNode},
};

/// Apply a scoring patch to one participant.
///
/// Validation happens before any read so a bad patch never touches the store.
/// Judges and the director may edit; the patch is a merge, so concurrent
/// judges only clobber the fields they both name.
pub async fn apply_scoring(
    node: &SharedNode,
    participant_id: Uuid,
    patch: &ScoringPatch,
) -> Result<ParticipantRecord, ServiceError> {
    if !matches!(node.role(), Role::Judge | Role::Director) {
        return Err(ServiceError::WrongRole("scoring edits".into()));
    }
    validate_scoring_patch(patch, node.config())?;

    let store = node.store().await.ok_or(ServiceError::Degraded)?;
    let mut record = store
        .read_participant(participant_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("participant {participant_id}")))?;

    merge_patch(&mut record.scoring, patch);
    store.upsert_participant(record.clone()).await?;
    info!(participant = %participant_id, "scoring updated");
    Ok(record)
}

/// Merge a patch into a scoring bundle. Only named fields change; the typed
/// landing grade wins over the free-text one when both are present.
fn merge_patch(scoring: &mut ScoringInputs, patch: &ScoringPatch) {
    if let Some(value) = patch.used_budget {
        scoring.used_budget = Some(value);
    }
    if let Some(value) = patch.rover_bonus_granted {
        scoring.rover_bonus_granted = value;
    }
    if let Some(value) = patch.return_bonus_granted {
        scoring.return_bonus_granted = value;
    }
    if let Some(value) = patch.aesthetics_bonus {
        scoring.aesthetics_bonus = Some(value);
    }
    if let Some(grade) = patch.landing_grade {
        scoring.landing_grade = grade;
    } else if let Some(text) = &patch.landing_grade_text {
        scoring.landing_grade = LandingGrade::parse_lenient(text);
    }
    if let Some(value) = patch.extra_penalty_seconds {
        scoring.extra_penalty_seconds = Some(value);
    }
    if let Some(notes) = &patch.notes {
        scoring.notes = Some(notes.clone());
    }
}
