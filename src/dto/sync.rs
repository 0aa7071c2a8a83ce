//! Wire payloads for the synchronized-launch protocol.
//!
//! Field names are camelCase on the wire so payloads stay readable in bus
//! traces alongside the rest of the event vocabulary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::models::MissionPhase;

/// Director probe sent once per second while a launch session is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProbe {
    /// Opaque session the probe belongs to.
    pub session_id: Uuid,
    /// Phase the session is preparing to start.
    pub phase: MissionPhase,
    /// Director local clock at send time, epoch milliseconds.
    pub director_epoch_ms: i64,
}

/// Participant reply to a probe; the authoritative two-party sync sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Session the response answers.
    pub session_id: Uuid,
    /// Phase echoed from the probe.
    pub phase: MissionPhase,
    /// Responding participant.
    pub participant_id: Uuid,
    /// Display name for the director's ready board.
    pub display_name: String,
    /// Participant local clock at receive time, epoch milliseconds.
    pub client_epoch_ms: i64,
    /// Computed `director_epoch_ms - client_epoch_ms`.
    pub offset_ms: i64,
    /// When the response was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub responded_at: OffsetDateTime,
}

/// Final commit closing a launch session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCommit {
    /// Session being committed.
    pub session_id: Uuid,
    /// Phase about to start.
    pub phase: MissionPhase,
    /// Per-participant offsets gathered during the session.
    pub offsets_by_participant: IndexMap<Uuid, i64>,
    /// Director-clock instant of the commit.
    #[serde(with = "time::serde::rfc3339")]
    pub committed_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_uses_camel_case_wire_names() {
        let probe = SyncProbe {
            session_id: Uuid::nil(),
            phase: MissionPhase::Build,
            director_epoch_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&probe).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("directorEpochMs").is_some());
        assert_eq!(json["phase"], "BUILD");
    }

    #[test]
    fn commit_offsets_round_trip() {
        let participant = Uuid::new_v4();
        let mut offsets = IndexMap::new();
        offsets.insert(participant, -10_000_i64);
        let commit = SyncCommit {
            session_id: Uuid::new_v4(),
            phase: MissionPhase::Flight,
            offsets_by_participant: offsets,
            committed_at: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&commit).unwrap();
        let parsed: SyncCommit = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.offsets_by_participant[&participant], -10_000);
    }
}
