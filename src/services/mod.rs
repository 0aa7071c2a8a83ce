//! Role operations and background loops built on top of the shared node.

pub mod director;
pub mod judge;
pub mod launch;
pub mod pilot;
pub mod reconcile;
pub mod scoring;
pub mod store_supervisor;
pub mod sync_events;
