//! Launch-sync event vocabulary and publish helpers.
//!
//! Publishing is best effort: the state store is the source of truth, so a
//! failed broadcast is logged and swallowed rather than failing the caller.

use std::sync::Arc;

use tracing::warn;

use crate::{
    bus::{BroadcastChannel, BusEnvelope, LAUNCH_SYNC_TOPIC},
    dto::sync::{SyncCommit, SyncProbe, SyncResponse},
};

/// Director probe opening or keeping a launch session warm.
pub const EVENT_SYNC_REQUEST: &str = "sync-request";
/// Participant reply carrying its clock sample.
pub const EVENT_SYNC_RESPONSE: &str = "sync-response";
/// Director commit closing the session and scheduling the launch.
pub const EVENT_SYNC_COMMIT: &str = "sync-commit";

/// Broadcast a launch-sync probe.
pub async fn publish_probe(bus: &Arc<dyn BroadcastChannel>, probe: &SyncProbe) {
    publish(bus, EVENT_SYNC_REQUEST, probe).await;
}

/// Broadcast a participant's sync response.
pub async fn publish_response(bus: &Arc<dyn BroadcastChannel>, response: &SyncResponse) {
    publish(bus, EVENT_SYNC_RESPONSE, response).await;
}

/// Broadcast the launch commit.
pub async fn publish_commit(bus: &Arc<dyn BroadcastChannel>, commit: &SyncCommit) {
    publish(bus, EVENT_SYNC_COMMIT, commit).await;
}

async fn publish<T: serde::Serialize>(bus: &Arc<dyn BroadcastChannel>, event: &str, payload: &T) {
    let envelope = match BusEnvelope::json(LAUNCH_SYNC_TOPIC, event, payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(event, error = %err, "failed to serialise launch-sync event");
            return;
        }
    };
    if let Err(err) = bus.publish(envelope).await {
        warn!(event, error = %err, "failed to publish launch-sync event");
    }
}
