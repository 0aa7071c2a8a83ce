//! Judge-side input patch for a participant's scoring bundle.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::dao::models::LandingGrade;

/// Partial update to a participant's scoring inputs.
///
/// Merge semantics: only named fields change. `landing_grade_text` is the
/// free-text alternative to `landing_grade` and is parsed leniently; when both
/// are present the typed field wins.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringPatch {
    /// Construction budget spent.
    #[serde(default)]
    pub used_budget: Option<u32>,
    /// Grant or revoke the rover objective bonus.
    #[serde(default)]
    pub rover_bonus_granted: Option<bool>,
    /// Grant or revoke the return objective bonus.
    #[serde(default)]
    pub return_bonus_granted: Option<bool>,
    /// Aesthetics bonus in seconds.
    #[serde(default)]
    pub aesthetics_bonus: Option<u8>,
    /// Typed landing grade.
    #[serde(default)]
    pub landing_grade: Option<LandingGrade>,
    /// Free-text landing grade as judges actually type it.
    #[serde(default)]
    pub landing_grade_text: Option<String>,
    /// Additional penalty in seconds.
    #[serde(default)]
    pub extra_penalty_seconds: Option<u32>,
    /// Judge notes.
    #[serde(default)]
    pub notes: Option<String>,
}
