//! Service-layer error taxonomy.
//!
//! Transient adapter failures degrade functionality instead of crashing a
//! client; the variants here exist so callers can tell misuse (invalid state,
//! bad input, wrong role) apart from infrastructure trouble.

use thiserror::Error;

use crate::{bus::BusError, dao::storage::StorageError, state::state_machine::InvalidTransition};

/// Errors surfaced by role operations and the launch coordinator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The state store backend failed.
    #[error("state store unavailable")]
    Unavailable(#[source] StorageError),
    /// The node is running without a store backend.
    #[error("state store unavailable (degraded mode)")]
    Degraded,
    /// The broadcast channel refused a message that the caller required.
    #[error("broadcast channel unavailable")]
    BusUnavailable(#[source] BusError),
    /// The operation is reserved for another role.
    #[error("operation not permitted for this role: {0}")]
    WrongRole(String),
    /// Invalid input provided at the boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current mission state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<BusError> for ServiceError {
    fn from(err: BusError) -> Self {
        ServiceError::BusUnavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}
