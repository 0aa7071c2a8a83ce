//! Wire payloads and input validation.

pub mod judge;
pub mod sync;
pub mod validation;
