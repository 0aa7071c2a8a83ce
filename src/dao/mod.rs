//! State store adapter: record models, the store trait, and the in-memory backend.

pub mod memory;
pub mod mission_store;
pub mod models;
pub mod storage;
