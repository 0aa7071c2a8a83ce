//! Store supervision: connect, watch health, reconnect with backoff.

use std::{future::Future, sync::Arc};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{mission_store::MissionStore, storage::StorageError},
    state::SharedNode,
};

/// Keep `node` connected to a store backend for the lifetime of the task.
///
/// `connect` is retried with exponential backoff until it yields a backend.
/// An installed backend is then health-polled; on failure it gets a bounded
/// number of reconnect attempts before being torn down, at which point the
/// outer connect loop starts over. The node is degraded whenever no healthy
/// backend is installed: reads serve the last reconciled view and writes fail
/// with a degraded error instead of crashing the client. All intervals come
/// from the node's [`crate::config::MissionConfig`].
pub async fn run<F, Fut>(node: SharedNode, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MissionStore>, StorageError>> + Send,
{
    let initial = node.config().store_retry_initial;
    let max = node.config().store_retry_max;
    let mut delay = initial;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "store connect failed; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(max);
                continue;
            }
        };
        node.install_store(store.clone()).await;
        info!("store backend installed");
        delay = initial;

        watch_health(&node, store.as_ref()).await;

        // Beyond recovery: tear the backend down and connect from scratch.
        node.clear_store().await;
        sleep(delay).await;
        delay = (delay * 2).min(max);
    }
}

/// Poll the backend's health until it fails beyond the reconnect budget.
async fn watch_health(node: &SharedNode, store: &dyn MissionStore) {
    loop {
        if store.health_check().await.is_ok() {
            node.update_degraded(false).await;
            sleep(node.config().store_health_interval).await;
            continue;
        }
        warn!("store health check failed; entering degraded mode");
        node.update_degraded(true).await;
        if !try_reconnect(node, store).await {
            warn!("store reconnect attempts exhausted");
            return;
        }
        info!("store reconnected; leaving degraded mode");
        node.update_degraded(false).await;
    }
}

/// Bounded reconnect attempts with exponential backoff.
async fn try_reconnect(node: &SharedNode, store: &dyn MissionStore) -> bool {
    let mut delay = node.config().store_retry_initial;
    for attempt in 1..=node.config().store_reconnect_attempts {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "store reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(node.config().store_retry_max);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MissionConfig,
        dao::memory::MemoryMissionStore,
        state::{MissionNode, Role},
    };
    use std::time::Duration;

    fn fast_config() -> MissionConfig {
        MissionConfig {
            store_health_interval: Duration::from_millis(10),
            store_retry_initial: Duration::from_millis(10),
            store_retry_max: Duration::from_millis(40),
            ..MissionConfig::default()
        }
    }

    #[tokio::test]
    async fn successful_connect_leaves_degraded_mode() {
        let node = MissionNode::new(Role::Spectator, fast_config());
        assert!(node.is_degraded().await);
        let mut degraded = node.degraded_watcher();

        let supervisor = tokio::spawn(run(node.clone(), || async {
            Ok(Arc::new(MemoryMissionStore::new()) as Arc<dyn MissionStore>)
        }));

        degraded
            .wait_for(|value| !*value)
            .await
            .expect("degraded watch should flip to false");
        assert!(!node.is_degraded().await);

        supervisor.abort();
    }

    #[tokio::test]
    async fn outage_toggles_degraded_mode_until_recovery() {
        let node = MissionNode::new(Role::Spectator, fast_config());
        let mut degraded = node.degraded_watcher();

        let backend = MemoryMissionStore::new();
        let connectable = backend.clone();
        let supervisor = tokio::spawn(run(node.clone(), move || {
            let store = connectable.clone();
            async move { Ok(Arc::new(store) as Arc<dyn MissionStore>) }
        }));

        degraded
            .wait_for(|value| !*value)
            .await
            .expect("initial connect should leave degraded mode");

        backend.set_offline(true);
        degraded
            .wait_for(|value| *value)
            .await
            .expect("a failing health check should enter degraded mode");

        // Whether through a reconnect attempt or a full reconnection, a
        // healthy backend brings the node back out of degraded mode.
        backend.set_offline(false);
        degraded
            .wait_for(|value| !*value)
            .await
            .expect("a healthy backend should leave degraded mode");

        supervisor.abort();
    }
}
