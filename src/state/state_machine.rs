//! Mission phase state machine.
//!
//! Legal transitions: IDLE → BUILD → FLIGHT, and a forced return to IDLE from
//! anywhere. The machine owns the invariant that a start instant exists
//! exactly when a phase is running, and that any applied transition resolves
//! whatever countdown was pending.

use thiserror::Error;
use time::OffsetDateTime;

use crate::dao::models::{MissionPhase, MissionRecord};

/// Director intents that can be applied to the mission timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Open the BUILD window from the lobby.
    StartBuild,
    /// Open the FLIGHT window after BUILD.
    StartFlight,
    /// Force the mission back to the lobby from any phase.
    Stop,
}

impl PhaseEvent {
    /// The event that moves the timeline to `target`.
    pub fn for_target(target: MissionPhase) -> PhaseEvent {
        match target {
            MissionPhase::Idle => PhaseEvent::Stop,
            MissionPhase::Build => PhaseEvent::StartBuild,
            MissionPhase::Flight => PhaseEvent::StartFlight,
        }
    }
}

/// Error returned when attempting an illegal phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the timeline was in when the event arrived.
    pub from: MissionPhase,
    /// The rejected event.
    pub event: PhaseEvent,
}

/// Compute the phase an event leads to, if the transition is legal.
pub fn compute_transition(
    from: MissionPhase,
    event: PhaseEvent,
) -> Result<MissionPhase, InvalidTransition> {
    match (from, event) {
        (MissionPhase::Idle, PhaseEvent::StartBuild) => Ok(MissionPhase::Build),
        (MissionPhase::Build, PhaseEvent::StartFlight) => Ok(MissionPhase::Flight),
        (_, PhaseEvent::Stop) => Ok(MissionPhase::Idle),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}

/// Produce the record an applied event results in.
///
/// Entering BUILD or FLIGHT stamps the start instant with the authoritative
/// clock; returning to IDLE clears it. Either way the pending countdown is
/// resolved, and entering BUILD discards any stale winner announcement so a
/// new attempt never starts under a reveal.
pub fn next_record(
    current: &MissionRecord,
    event: PhaseEvent,
    now: OffsetDateTime,
) -> Result<MissionRecord, InvalidTransition> {
    let phase = compute_transition(current.phase, event)?;
    Ok(MissionRecord {
        phase,
        phase_started_at: (phase != MissionPhase::Idle).then_some(now),
        pending_launch: None,
        winner_announcement: match phase {
            MissionPhase::Build => None,
            _ => current.winner_announcement.clone(),
        },
    })
}

/// Local, authoritative view of the timeline held by the director node.
#[derive(Debug, Clone, Default)]
pub struct PhaseStateMachine {
    record: MissionRecord,
}

impl PhaseStateMachine {
    /// Start in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> MissionPhase {
        self.record.phase
    }

    /// Current record value.
    pub fn record(&self) -> &MissionRecord {
        &self.record
    }

    /// Apply a director event, returning the new record to be persisted.
    pub fn transition(
        &mut self,
        event: PhaseEvent,
        now: OffsetDateTime,
    ) -> Result<MissionRecord, InvalidTransition> {
        let next = next_record(&self.record, event, now)?;
        self.record = next.clone();
        Ok(next)
    }

    /// Replace the local view with a fresh record from the store.
    ///
    /// The store is the source of truth: the replacement is unconditional.
    /// Returns whether the phase itself changed, so callers know to cancel
    /// local countdown state.
    pub fn reconcile(&mut self, fresh: MissionRecord) -> bool {
        let phase_changed = self.record.phase != fresh.phase;
        self.record = fresh;
        phase_changed
    }
}
