//! Coordination core for live timed rocketry heats.
//!
//! One director drives a shared mission timeline (lobby, build window, flight
//! window) that every connected client renders from the same authoritative
//! clock. The crate supplies the clock sync engine, the synchronized-launch
//! protocol, the scoring and ranking engine, and the reconciliation loops
//! that keep clients consistent over an unreliable state store and a
//! best-effort broadcast channel. UI layers sit on top; nothing here renders.

pub mod bus;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;

pub use config::MissionConfig;
pub use error::ServiceError;
pub use state::{MissionNode, Role, SharedNode};
