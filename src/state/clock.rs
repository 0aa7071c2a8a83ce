//! Clock sync engine: each client's estimate of the director's wall clock.
//!
//! The estimate is a single signed offset applied to the local clock. It is
//! fed from two places with very different confidence: the launch-sync commit
//! (a direct two-party exchange) and passive inference from discrete store
//! events (a one-shot corrective filter, not a protocol). Passive corrections
//! never override a commit-sourced offset.

use std::sync::RwLock;

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::MissionConfig;

/// Provenance of the current clock offset, in increasing confidence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OffsetSource {
    /// No correction has been applied; the local clock is used as-is.
    Local,
    /// Heuristic one-shot correction inferred from store polls.
    PollInferred,
    /// Direct two-party sample delivered by a launch-sync commit.
    BroadcastCommit,
}

#[derive(Debug, Clone)]
struct ClockState {
    offset_ms: i64,
    source: OffsetSource,
    last_synced_at: Option<OffsetDateTime>,
}

/// Per-client clock estimate of the director's wall clock.
pub struct ClockSyncEngine {
    /// The director is the authority; its offset is pinned to zero.
    authority: bool,
    max_offset_ms: i64,
    state: RwLock<ClockState>,
}

impl ClockSyncEngine {
    /// Build an engine. `authority` pins the offset to zero (the director IS
    /// the timeline).
    pub fn new(config: &MissionConfig, authority: bool) -> Self {
        Self {
            authority,
            max_offset_ms: config.max_clock_offset_ms,
            state: RwLock::new(ClockState {
                offset_ms: 0,
                source: OffsetSource::Local,
                last_synced_at: None,
            }),
        }
    }

    /// Best current estimate of the director's wall clock. Never fails: with
    /// no sync source available this is the raw local clock plus the last
    /// known offset.
    pub fn authoritative_now(&self) -> OffsetDateTime {
        self.project(OffsetDateTime::now_utc())
    }

    /// Project a local instant onto the authoritative timeline.
    pub fn project(&self, local: OffsetDateTime) -> OffsetDateTime {
        if self.authority {
            return local;
        }
        let offset_ms = match self.state.read() {
            Ok(state) => state.offset_ms,
            Err(poisoned) => poisoned.into_inner().offset_ms,
        };
        local + time::Duration::milliseconds(offset_ms)
    }

    /// Atomically replace the stored offset. Last writer wins by call time,
    /// regardless of source. Implausible values are clamped to the configured
    /// bound so one noisy sample cannot swing the clock arbitrarily.
    pub fn apply_offset(&self, offset_ms: i64, source: OffsetSource) {
        if self.authority {
            debug!(offset_ms, "ignoring offset on the authority clock");
            return;
        }
        let clamped = offset_ms.clamp(-self.max_offset_ms, self.max_offset_ms);
        if clamped != offset_ms {
            info!(offset_ms, clamped, "clock offset clamped as implausible");
        }
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.offset_ms = clamped;
        state.source = source;
        state.last_synced_at = Some(OffsetDateTime::now_utc());
        debug!(offset_ms = clamped, ?source, "clock offset applied");
    }

    /// Current offset in milliseconds (director-clock minus local-clock).
    pub fn offset_millis(&self) -> i64 {
        match self.state.read() {
            Ok(state) => state.offset_ms,
            Err(poisoned) => poisoned.into_inner().offset_ms,
        }
    }

    /// Provenance of the current offset.
    pub fn source(&self) -> OffsetSource {
        match self.state.read() {
            Ok(state) => state.source,
            Err(poisoned) => poisoned.into_inner().source,
        }
    }

    /// When the offset was last written, if ever.
    pub fn last_synced_at(&self) -> Option<OffsetDateTime> {
        match self.state.read() {
            Ok(state) => state.last_synced_at,
            Err(poisoned) => poisoned.into_inner().last_synced_at,
        }
    }

    /// Passive inference: a pending launch just appeared in the store.
    ///
    /// The countdown end should sit roughly `countdown_lead` ahead of now. A
    /// larger deviation means our clock estimate is off; nudge by the
    /// deviation. Returns the applied correction, if any.
    pub fn observe_pending_launch(
        &self,
        ends_at: OffsetDateTime,
        config: &MissionConfig,
    ) -> Option<i64> {
        if self.authority || self.source() == OffsetSource::BroadcastCommit {
            return None;
        }
        let lead_ms = millis_between(self.authoritative_now(), ends_at);
        let expected_ms = config.countdown_lead.as_millis() as i64;
        let deviation = lead_ms - expected_ms;
        if deviation > config.launch_early_tolerance_ms
            || deviation < -config.launch_late_tolerance_ms
        {
            let corrected = self.offset_millis() + deviation;
            info!(deviation, corrected, "pending launch implies clock drift; nudging offset");
            self.apply_offset(corrected, OffsetSource::PollInferred);
            Some(deviation)
        } else {
            None
        }
    }

    /// Passive inference: a phase transition was just observed.
    ///
    /// Elapsed time since `started_at` should be near zero at the instant the
    /// transition is first seen; a large residual is snapped out of the
    /// offset. Returns the applied correction, if any.
    pub fn observe_phase_start(
        &self,
        started_at: OffsetDateTime,
        config: &MissionConfig,
    ) -> Option<i64> {
        if self.authority || self.source() == OffsetSource::BroadcastCommit {
            return None;
        }
        let residual = millis_between(started_at, self.authoritative_now());
        if residual.abs() > config.phase_residual_tolerance_ms {
            let corrected = self.offset_millis() - residual;
            info!(residual, corrected, "phase start residual too large; snapping offset");
            self.apply_offset(corrected, OffsetSource::PollInferred);
            Some(-residual)
        } else {
            None
        }
    }
}

/// Signed milliseconds from `from` to `to`.
pub fn millis_between(from: OffsetDateTime, to: OffsetDateTime) -> i64 {
    ((to - from).whole_nanoseconds() / 1_000_000) as i64
}

/// Epoch milliseconds of an instant.
pub fn epoch_ms(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Instant from epoch milliseconds; saturates at the epoch on out-of-range input.
pub fn from_epoch_ms(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> ClockSyncEngine {
        ClockSyncEngine::new(&MissionConfig::default(), false)
    }

    #[test]
    fn applying_same_offset_twice_is_idempotent() {
        let clock = engine();
        let local = OffsetDateTime::now_utc();

        clock.apply_offset(-10_000, OffsetSource::BroadcastCommit);
        let once = clock.project(local);
        clock.apply_offset(-10_000, OffsetSource::BroadcastCommit);
        let twice = clock.project(local);

        assert_eq!(once, twice);
        assert_eq!(clock.offset_millis(), -10_000);
    }

    #[test]
    fn commit_offset_corrects_a_clock_ten_seconds_ahead() {
        // Local clock ahead of the director by 10s: the commit carries -10000.
        let clock = engine();
        clock.apply_offset(-10_000, OffsetSource::BroadcastCommit);

        let local = OffsetDateTime::now_utc();
        let authoritative = clock.project(local);
        assert_eq!(millis_between(authoritative, local), 10_000);
        assert_eq!(clock.source(), OffsetSource::BroadcastCommit);
        assert!(clock.last_synced_at().is_some());
    }

    #[test]
    fn implausible_offsets_are_clamped() {
        let clock = engine();
        clock.apply_offset(3_600_000, OffsetSource::PollInferred);
        assert_eq!(clock.offset_millis(), 60_000);

        clock.apply_offset(-3_600_000, OffsetSource::PollInferred);
        assert_eq!(clock.offset_millis(), -60_000);
    }

    #[test]
    fn last_writer_wins_regardless_of_source() {
        let clock = engine();
        clock.apply_offset(-10_000, OffsetSource::BroadcastCommit);
        clock.apply_offset(500, OffsetSource::PollInferred);
        assert_eq!(clock.offset_millis(), 500);
        assert_eq!(clock.source(), OffsetSource::PollInferred);
    }

    #[test]
    fn authority_clock_ignores_offsets() {
        let clock = ClockSyncEngine::new(&MissionConfig::default(), true);
        clock.apply_offset(-10_000, OffsetSource::BroadcastCommit);
        assert_eq!(clock.offset_millis(), 0);

        let local = OffsetDateTime::now_utc();
        assert_eq!(clock.project(local), local);
    }

    #[test]
    fn pending_launch_far_in_future_nudges_offset_forward() {
        let clock = engine();
        let config = MissionConfig::default();
        // Countdown end 20s away while the lead should be 3s: we are ~17s behind.
        let ends_at = OffsetDateTime::now_utc() + Duration::from_secs(20);

        let applied = clock.observe_pending_launch(ends_at, &config);
        let deviation = applied.expect("deviation beyond tolerance must nudge");
        assert!((16_500..=17_500).contains(&deviation));
        assert!((16_500..=17_500).contains(&clock.offset_millis()));
        assert_eq!(clock.source(), OffsetSource::PollInferred);
    }

    #[test]
    fn pending_launch_within_tolerance_leaves_offset_alone() {
        let clock = engine();
        let config = MissionConfig::default();
        let ends_at = OffsetDateTime::now_utc() + Duration::from_secs(4);
        assert!(clock.observe_pending_launch(ends_at, &config).is_none());
        assert_eq!(clock.offset_millis(), 0);
    }

    #[test]
    fn phase_start_residual_snaps_offset() {
        let clock = engine();
        let config = MissionConfig::default();
        // Transition observed 10s after its recorded start: estimate is 10s fast.
        let started_at = OffsetDateTime::now_utc() - Duration::from_secs(10);

        let applied = clock.observe_phase_start(started_at, &config);
        let correction = applied.expect("residual beyond tolerance must snap");
        assert!((-10_500..=-9_500).contains(&correction));
        assert!((-10_500..=-9_500).contains(&clock.offset_millis()));
    }

    #[test]
    fn passive_inference_defers_to_commit_sourced_offset() {
        let clock = engine();
        let config = MissionConfig::default();
        clock.apply_offset(-2_000, OffsetSource::BroadcastCommit);

        let ends_at = OffsetDateTime::now_utc() + Duration::from_secs(30);
        assert!(clock.observe_pending_launch(ends_at, &config).is_none());

        let started_at = OffsetDateTime::now_utc() - Duration::from_secs(30);
        assert!(clock.observe_phase_start(started_at, &config).is_none());
        assert_eq!(clock.offset_millis(), -2_000);
    }

    #[test]
    fn epoch_helpers_round_trip() {
        let now = OffsetDateTime::now_utc();
        let ms = epoch_ms(now);
        let back = from_epoch_ms(ms);
        assert!(millis_between(back, now).abs() < 1);
    }
}
