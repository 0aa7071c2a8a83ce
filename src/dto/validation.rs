//! Validation helpers for judge-editable scoring input.
//!
//! `compute_score` must only ever receive sanitized values, so everything a
//! judge can type is checked here, at the boundary.

use validator::{ValidationError, ValidationErrors};

use crate::{config::MissionConfig, dto::judge::ScoringPatch};

/// Validates that an aesthetics bonus stays within the configured bound.
pub fn validate_aesthetics_bonus(value: u8, max: u8) -> Result<(), ValidationError> {
    if value > max {
        let mut err = ValidationError::new("aesthetics_bonus_range");
        err.message = Some(format!("aesthetics bonus must be 0..={max} (got {value})").into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a reported budget does not exceed the total budget.
pub fn validate_used_budget(value: u32, total: u32) -> Result<(), ValidationError> {
    if value > total {
        let mut err = ValidationError::new("used_budget_range");
        err.message = Some(format!("used budget must be 0..={total} (got {value})").into());
        return Err(err);
    }
    Ok(())
}

/// Validate a full scoring patch against the mission configuration.
pub fn validate_scoring_patch(
    patch: &ScoringPatch,
    config: &MissionConfig,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(value) = patch.aesthetics_bonus
        && let Err(err) = validate_aesthetics_bonus(value, config.aesthetics_bonus_max)
    {
        errors.add("aesthetics_bonus", err);
    }

    if let Some(value) = patch.used_budget
        && let Err(err) = validate_used_budget(value, config.total_budget)
    {
        errors.add("used_budget", err);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
