//! Record types shared through the state store.
//!
//! These are the only durable shapes in the system. Everything derived
//! (score breakdowns, display clocks, reveal stages) is recomputed from them.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use time::OffsetDateTime;
use uuid::Uuid;

/// High-level phase of the shared mission timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionPhase {
    /// Lobby: no timer is running, registration and resets happen here.
    Idle,
    /// Preparation window with a fixed-length countdown.
    Build,
    /// Timed attempt window, counting up per participant.
    Flight,
}

impl MissionPhase {
    /// Human-facing label used in operator displays.
    pub fn label(self) -> &'static str {
        match self {
            MissionPhase::Idle => "LOBBY",
            MissionPhase::Build => "BUILD",
            MissionPhase::Flight => "FLIGHT",
        }
    }
}

/// An in-progress synchronized-countdown announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLaunch {
    /// Authoritative wall-clock instant the countdown reaches zero.
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    /// Phase that will begin when the countdown expires.
    pub label: MissionPhase,
}

/// Minimal identity of the winning participant carried in the announcement.
///
/// Detailed figures are intentionally absent: every client recomputes the
/// breakdown from participant records so the announcement can never disagree
/// with the scoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerSummary {
    /// Identifier of the winning participant.
    pub participant_id: Uuid,
    /// Display name at the time of the announcement.
    pub display_name: String,
}

/// Director-issued winner announcement driving the synchronized reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerAnnouncement {
    /// Authoritative instant the announcement was made.
    #[serde(with = "time::serde::rfc3339")]
    pub announced_at: OffsetDateTime,
    /// The ranking's head at announcement time.
    pub winner: WinnerSummary,
}

/// The shared mission record: a named singleton in the state store.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRecord {
    /// Current mission phase.
    pub phase: MissionPhase,
    /// Wall-clock instant the current non-IDLE phase began.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub phase_started_at: Option<OffsetDateTime>,
    /// In-progress synchronized-countdown announcement, if any.
    #[serde(default)]
    pub pending_launch: Option<PendingLaunch>,
    /// Winner announcement once the director has locked the ranking.
    #[serde(default)]
    pub winner_announcement: Option<WinnerAnnouncement>,
}

impl MissionRecord {
    /// Record value at system bootstrap.
    pub fn idle() -> Self {
        Self {
            phase: MissionPhase::Idle,
            phase_started_at: None,
            pending_launch: None,
            winner_announcement: None,
        }
    }

    /// `phase_started_at` must be present exactly when the phase is not IDLE.
    pub fn invariant_holds(&self) -> bool {
        self.phase_started_at.is_some() == (self.phase != MissionPhase::Idle)
    }
}

impl Default for MissionRecord {
    fn default() -> Self {
        Self::idle()
    }
}

/// Where a participant currently is in the heat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Registered, waiting for the heat to start.
    Waiting,
    /// Building during the BUILD window.
    Building,
    /// Airborne during the FLIGHT window.
    Flying,
    /// Landed; flight timing is frozen.
    Landed,
}

impl ParticipantStatus {
    /// Clamp this status against the store's authoritative phase.
    ///
    /// A status contradicting the phase can be observed transiently during a
    /// phase-change race; the phase wins and the status is moved forward or
    /// back without error. Landed is terminal for the heat and IDLE freezes
    /// everything so results survive a stop.
    pub fn reconciled_with(self, phase: MissionPhase) -> ParticipantStatus {
        match (phase, self) {
            (_, ParticipantStatus::Landed) => ParticipantStatus::Landed,
            (MissionPhase::Idle, status) => status,
            (MissionPhase::Build, ParticipantStatus::Flying) => ParticipantStatus::Building,
            (MissionPhase::Build, status) => status,
            (MissionPhase::Flight, ParticipantStatus::Waiting)
            | (MissionPhase::Flight, ParticipantStatus::Building) => ParticipantStatus::Flying,
            (MissionPhase::Flight, status) => status,
        }
    }
}

/// Judge-assigned qualitative outcome of a landing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandingGrade {
    /// Not graded yet.
    #[default]
    Unset,
    /// Textbook soft touchdown; earns a time credit.
    PerfectSoft,
    /// Rough but intact; no adjustment.
    Hard,
    /// Structural damage on touchdown; charged a time penalty.
    Crunch,
    /// Excluded from numeric ranking.
    Disqualified,
}

impl LandingGrade {
    /// Parse a free-text grade the way judges actually type them.
    ///
    /// Matching is substring-based and case-insensitive; anything
    /// unrecognized maps to [`LandingGrade::Unset`].
    pub fn parse_lenient(value: &str) -> LandingGrade {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return LandingGrade::Unset;
        }
        if normalized.contains("soft") || normalized.contains("perfect") {
            LandingGrade::PerfectSoft
        } else if normalized.contains("hard") {
            LandingGrade::Hard
        } else if normalized.contains("crunch") {
            LandingGrade::Crunch
        } else if normalized.contains("dq") || normalized.contains("exploded") {
            LandingGrade::Disqualified
        } else {
            LandingGrade::Unset
        }
    }

    /// Label used wherever the grade is displayed.
    pub fn label(self) -> &'static str {
        match self {
            LandingGrade::Unset => "Not provided",
            LandingGrade::PerfectSoft => "Perfect Soft",
            LandingGrade::Hard => "Hard",
            LandingGrade::Crunch => "Crunch",
            LandingGrade::Disqualified => "Disqualified",
        }
    }
}

/// Judge-editable scoring bundle attached to a participant.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoringInputs {
    /// Construction budget actually spent, when reported.
    #[serde(default)]
    pub used_budget: Option<u32>,
    /// Whether the rover objective was achieved.
    #[serde(default)]
    pub rover_bonus_granted: bool,
    /// Whether the return objective was achieved.
    #[serde(default)]
    pub return_bonus_granted: bool,
    /// Judge-assigned aesthetics bonus, bounded by the mission config.
    #[serde(default)]
    pub aesthetics_bonus: Option<u8>,
    /// Qualitative landing outcome.
    #[serde(default)]
    pub landing_grade: LandingGrade,
    /// Additional penalty seconds assessed by the judges.
    #[serde(default)]
    pub extra_penalty_seconds: Option<u32>,
    /// Free-text judge notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// A registered participant and everything recorded about their heat.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Opaque identity assigned at registration.
    pub id: Uuid,
    /// Team callsign shown on every surface.
    pub display_name: String,
    /// Registration instant; first-level ranking tie-break.
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    /// Current heat status.
    pub status: ParticipantStatus,
    /// Instant this participant's flight clock started.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub flight_start: Option<OffsetDateTime>,
    /// Instant this participant landed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub land_time: Option<OffsetDateTime>,
    /// Explicit recorded flight duration; authoritative once written.
    #[serde(default)]
    pub flight_duration_seconds: Option<i64>,
    /// Judge-editable scoring bundle.
    #[serde(default)]
    pub scoring: ScoringInputs,
}

impl ParticipantRecord {
    /// Fresh registration record.
    pub fn register(display_name: String, registered_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            registered_at,
            status: ParticipantStatus::Waiting,
            flight_start: None,
            land_time: None,
            flight_duration_seconds: None,
            scoring: ScoringInputs::default(),
        }
    }

    /// Reset everything heat-specific for a new round, keeping the identity.
    pub fn reset_for_new_heat(&mut self) {
        self.status = ParticipantStatus::Waiting;
        self.flight_start = None;
        self.land_time = None;
        self.flight_duration_seconds = None;
        self.scoring = ScoringInputs::default();
    }
}
