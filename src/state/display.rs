//! Pure derivation of the countdown display from the timeline and the clock.
//!
//! Re-run at a fixed tick so the displayed clock advances smoothly between
//! store polls; nothing here holds state.

use time::OffsetDateTime;

use crate::{
    config::MissionConfig,
    dao::models::{MissionPhase, MissionRecord},
};

/// What a client should currently render for the mission clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDisplay {
    /// Phase the display belongs to.
    pub phase: MissionPhase,
    /// `MM:SS` clock text.
    pub clock: String,
    /// Remaining seconds in BUILD, elapsed seconds in FLIGHT, zero in IDLE.
    pub seconds: i64,
    /// Raised when BUILD is nearly (or fully) out of time.
    pub alert: bool,
}

impl PhaseDisplay {
    /// The lobby display.
    pub fn idle() -> Self {
        Self {
            phase: MissionPhase::Idle,
            clock: "00:00".into(),
            seconds: 0,
            alert: false,
        }
    }
}

impl Default for PhaseDisplay {
    fn default() -> Self {
        Self::idle()
    }
}

/// Derive the display for `record` at authoritative instant `now`.
pub fn derive_display(
    record: &MissionRecord,
    now: OffsetDateTime,
    config: &MissionConfig,
) -> PhaseDisplay {
    let Some(started_at) = record.phase_started_at else {
        return PhaseDisplay::idle();
    };
    let elapsed = (now - started_at).whole_seconds();

    match record.phase {
        MissionPhase::Idle => PhaseDisplay::idle(),
        MissionPhase::Build => {
            let remaining = config.build_duration.as_secs() as i64 - elapsed;
            if remaining <= 0 {
                PhaseDisplay {
                    phase: MissionPhase::Build,
                    clock: "00:00".into(),
                    seconds: 0,
                    alert: true,
                }
            } else {
                PhaseDisplay {
                    phase: MissionPhase::Build,
                    clock: format_clock(remaining),
                    seconds: remaining,
                    alert: remaining < config.build_alert_threshold.as_secs() as i64,
                }
            }
        }
        MissionPhase::Flight => {
            let elapsed = elapsed.max(0);
            PhaseDisplay {
                phase: MissionPhase::Flight,
                clock: format_clock(elapsed),
                seconds: elapsed,
                alert: false,
            }
        }
    }
}

/// `MM:SS` rendering of a second count.
pub fn format_clock(total_seconds: i64) -> String {
    let total = total_seconds.unsigned_abs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(phase: MissionPhase, started_secs_ago: u64, now: OffsetDateTime) -> MissionRecord {
        MissionRecord {
            phase,
            phase_started_at: Some(now - Duration::from_secs(started_secs_ago)),
            pending_launch: None,
            winner_announcement: None,
        }
    }

    #[test]
    fn idle_shows_zeros() {
        let display = derive_display(
            &MissionRecord::idle(),
            OffsetDateTime::now_utc(),
            &MissionConfig::default(),
        );
        assert_eq!(display, PhaseDisplay::idle());
    }

    #[test]
    fn build_counts_down_from_thirty_minutes() {
        let config = MissionConfig::default();
        let now = OffsetDateTime::now_utc();
        let display = derive_display(&record(MissionPhase::Build, 60, now), now, &config);
        assert_eq!(display.seconds, 1_740);
        assert_eq!(display.clock, "29:00");
        assert!(!display.alert);
    }

    #[test]
    fn build_alerts_under_five_minutes_and_pins_at_zero() {
        let config = MissionConfig::default();
        let now = OffsetDateTime::now_utc();

        let closing = derive_display(&record(MissionPhase::Build, 1_600, now), now, &config);
        assert_eq!(closing.seconds, 200);
        assert!(closing.alert);

        let expired = derive_display(&record(MissionPhase::Build, 2_000, now), now, &config);
        assert_eq!(expired.clock, "00:00");
        assert_eq!(expired.seconds, 0);
        assert!(expired.alert);
    }

    #[test]
    fn flight_counts_up() {
        let config = MissionConfig::default();
        let now = OffsetDateTime::now_utc();
        let display = derive_display(&record(MissionPhase::Flight, 125, now), now, &config);
        assert_eq!(display.seconds, 125);
        assert_eq!(display.clock, "02:05");
        assert!(!display.alert);
    }

    #[test]
    fn flight_started_in_the_future_clamps_to_zero() {
        // A start instant slightly ahead of a drifting local clock must not
        // render a negative elapsed time.
        let config = MissionConfig::default();
        let now = OffsetDateTime::now_utc();
        let record = MissionRecord {
            phase: MissionPhase::Flight,
            phase_started_at: Some(now + Duration::from_secs(2)),
            pending_launch: None,
            winner_announcement: None,
        };
        let display = derive_display(&record, now, &config);
        assert_eq!(display.seconds, 0);
        assert_eq!(display.clock, "00:00");
    }
}
