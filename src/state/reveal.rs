//! Winner reveal sequencer read model.
//!
//! The announcement in the mission record plus the authoritative clock fully
//! determine the stage; no second protocol is needed for a consistent reveal
//! instant across clients.

use time::OffsetDateTime;

use crate::{config::MissionConfig, dao::models::WinnerAnnouncement, state::clock::millis_between};

/// Stage of the winner reveal on a given client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealStage {
    /// No announcement has been made.
    None,
    /// Announcement made; results stay masked while the hold runs out.
    Announced {
        /// The announcement driving the countdown.
        announcement: WinnerAnnouncement,
        /// Whole seconds left before full reveal (ceiling, at least 1).
        remaining_seconds: i64,
    },
    /// Hold expired; full results may be shown.
    Revealed {
        /// The announcement that is now fully visible.
        announcement: WinnerAnnouncement,
    },
}

/// Derive the reveal stage at authoritative instant `now`.
pub fn reveal_stage(
    announcement: Option<&WinnerAnnouncement>,
    now: OffsetDateTime,
    config: &MissionConfig,
) -> RevealStage {
    let Some(announcement) = announcement else {
        return RevealStage::None;
    };
    let reveal_at = announcement.announced_at + config.reveal_hold;
    let remaining_ms = millis_between(now, reveal_at);
    if remaining_ms > 0 {
        RevealStage::Announced {
            announcement: announcement.clone(),
            remaining_seconds: (remaining_ms + 999) / 1_000,
        }
    } else {
        RevealStage::Revealed {
            announcement: announcement.clone(),
        }
    }
}
