//! Scoring and ranking engine.
//!
//! Everything here is pure: a participant record plus the mission config
//! fully determine the breakdown, so every client recomputes scores locally
//! and always agrees with the director. Lower final scores rank first.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::MissionConfig,
    dao::models::{LandingGrade, ParticipantRecord},
    state::display::format_clock,
};

/// Final score of a participant, with the two non-numeric outcomes explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "snake_case")]
pub enum FinalScore {
    /// Net adjusted seconds; lower is better.
    Scored(i64),
    /// Flight not recorded yet; cannot be ranked numerically.
    Pending,
    /// Excluded from numeric ranking by the judges.
    Disqualified,
}

impl FinalScore {
    /// Ranking key. Non-scored outcomes sort after every scored one.
    pub fn sort_key(self) -> i64 {
        match self {
            FinalScore::Scored(seconds) => seconds,
            FinalScore::Pending | FinalScore::Disqualified => i64::MAX,
        }
    }

    /// Label used on the leaderboard.
    pub fn label(self) -> String {
        match self {
            FinalScore::Scored(seconds) => format!("{seconds}s"),
            FinalScore::Pending => "---".into(),
            FinalScore::Disqualified => "DQ".into(),
        }
    }
}

/// Full per-participant score breakdown, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Participant identity.
    pub participant_id: Uuid,
    /// Team callsign.
    pub display_name: String,
    /// Registration instant, carried for deterministic tie-breaking.
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    /// Raw flight duration in seconds, when recorded.
    pub flight_seconds: Option<i64>,
    /// `MM:SS` rendering of the flight, or a placeholder when unflown.
    pub flight_label: String,
    /// Budget bonus in seconds (subtracted from the flight time).
    pub budget_bonus_seconds: i64,
    /// Budget bonus label; notes when no budget was reported.
    pub budget_label: String,
    /// Rover objective bonus in seconds.
    pub rover_bonus_seconds: i64,
    /// Return objective bonus in seconds.
    pub return_bonus_seconds: i64,
    /// Judge-assigned aesthetics bonus in seconds.
    pub aesthetics_bonus_seconds: i64,
    /// Sum of every bonus, the soft-landing credit included; subtracted from
    /// the flight time.
    pub total_bonus_seconds: i64,
    /// Signed landing adjustment in seconds (credit negative, penalty positive).
    pub landing_adjust_seconds: i64,
    /// Landing grade label.
    pub landing_label: String,
    /// Judge-assessed extra penalty in seconds.
    pub extra_penalty_seconds: i64,
    /// Sum of every addition to the flight time.
    pub total_penalty_seconds: i64,
    /// Net outcome.
    pub final_score: FinalScore,
    /// Leaderboard label for the net outcome.
    pub final_label: String,
}

/// Budget bonus in seconds for a reported spend. Overspending earns nothing
/// rather than a penalty.
pub fn budget_bonus(used_budget: u32, config: &MissionConfig) -> i64 {
    let remaining = i64::from(config.total_budget) - i64::from(used_budget);
    (remaining / i64::from(config.budget_bonus_divisor)).max(0)
}

/// Signed landing adjustment for a grade. Disqualification is handled by the
/// caller; it has no numeric adjustment.
fn landing_adjust(grade: LandingGrade, config: &MissionConfig) -> i64 {
    match grade {
        LandingGrade::PerfectSoft => -config.soft_landing_credit_seconds,
        LandingGrade::Crunch => config.crunch_penalty_seconds,
        LandingGrade::Unset | LandingGrade::Hard | LandingGrade::Disqualified => 0,
    }
}

/// Compute the full breakdown for one participant.
pub fn compute_score(participant: &ParticipantRecord, config: &MissionConfig) -> ScoreBreakdown {
    let scoring = &participant.scoring;

    let budget_bonus_seconds = scoring
        .used_budget
        .map(|used| budget_bonus(used, config))
        .unwrap_or(0);
    let budget_label = match scoring.used_budget {
        Some(_) => format!("-{budget_bonus_seconds}s"),
        None => "Not provided".into(),
    };

    let rover_bonus_seconds = if scoring.rover_bonus_granted {
        config.rover_bonus_seconds
    } else {
        0
    };
    let return_bonus_seconds = if scoring.return_bonus_granted {
        config.return_bonus_seconds
    } else {
        0
    };
    let aesthetics_bonus_seconds = i64::from(
        scoring
            .aesthetics_bonus
            .unwrap_or(0)
            .min(config.aesthetics_bonus_max),
    );
    let landing_adjust_seconds = landing_adjust(scoring.landing_grade, config);
    let total_bonus_seconds = budget_bonus_seconds
        + rover_bonus_seconds
        + return_bonus_seconds
        + aesthetics_bonus_seconds
        + (-landing_adjust_seconds).max(0);

    let extra_penalty_seconds = i64::from(scoring.extra_penalty_seconds.unwrap_or(0));
    let total_penalty_seconds = landing_adjust_seconds.max(0) + extra_penalty_seconds;

    // The explicitly recorded duration is authoritative; an old record that
    // only carries timestamps still scores from land - start. Either path is
    // floored at zero so a corrupt record cannot buy time.
    let flight_seconds = participant
        .flight_duration_seconds
        .or_else(|| match (participant.flight_start, participant.land_time) {
            (Some(start), Some(land)) => Some((land - start).whole_seconds()),
            _ => None,
        })
        .map(|seconds| seconds.max(0));
    let flight_label = flight_seconds.map(format_clock).unwrap_or_else(|| "---".into());

    let final_score = if scoring.landing_grade == LandingGrade::Disqualified {
        FinalScore::Disqualified
    } else {
        match flight_seconds {
            Some(flight) => {
                FinalScore::Scored(flight - total_bonus_seconds + total_penalty_seconds)
            }
            None => FinalScore::Pending,
        }
    };

    ScoreBreakdown {
        participant_id: participant.id,
        display_name: participant.display_name.clone(),
        registered_at: participant.registered_at,
        flight_seconds,
        flight_label,
        budget_bonus_seconds,
        budget_label,
        rover_bonus_seconds,
        return_bonus_seconds,
        aesthetics_bonus_seconds,
        total_bonus_seconds,
        landing_adjust_seconds,
        landing_label: scoring.landing_grade.label().into(),
        extra_penalty_seconds,
        total_penalty_seconds,
        final_score,
        final_label: final_score.label(),
    }
}

/// Rank a participant set into a leaderboard.
///
/// Ordering is ascending final score; DQ and unscored entries always land
/// after every scored entry. Ties break on registration instant, then
/// case-insensitive name, then id, so the order is a strict total order and
/// identical on every client.
pub fn rank_participants(
    participants: &[ParticipantRecord],
    config: &MissionConfig,
) -> Vec<ScoreBreakdown> {
    let mut board: Vec<ScoreBreakdown> = participants
        .iter()
        .map(|participant| compute_score(participant, config))
        .collect();
    board.sort_by(|a, b| {
        a.final_score
            .sort_key()
            .cmp(&b.final_score.sort_key())
            .then_with(|| a.registered_at.cmp(&b.registered_at))
            .then_with(|| {
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase())
            })
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });
    board
}
