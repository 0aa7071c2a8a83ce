//! In-memory reference store backend.
//!
//! Used by the test suite and the heat simulator. It honors the adapter
//! contract exactly: full-replace writes, best-effort change notifications
//! that drop under lag, and a switchable outage mode for exercising the
//! degraded-mode paths.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::{
    mission_store::{MissionKey, MissionStore, StoreChange},
    models::{MissionRecord, ParticipantRecord},
    storage::{StorageError, StorageResult},
};

/// Capacity of the change-notification channel; slow subscribers lose
/// notifications rather than block writers, matching the adapter contract.
const CHANGE_CAPACITY: usize = 32;

/// Shared in-memory store. Cheap to clone; all clones view the same data.
#[derive(Clone)]
pub struct MemoryMissionStore {
    inner: Arc<Inner>,
}

struct Inner {
    missions: DashMap<&'static str, MissionRecord>,
    participants: DashMap<Uuid, ParticipantRecord>,
    changes: broadcast::Sender<StoreChange>,
    offline: AtomicBool,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated outage")]
struct SimulatedOutage;

impl MemoryMissionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _receiver) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                missions: DashMap::new(),
                participants: DashMap::new(),
                changes,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Toggle a simulated outage; while offline every operation fails.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn guard(&self) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "memory store offline".into(),
                SimulatedOutage,
            ))
        } else {
            Ok(())
        }
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is fine; lagging subscribers miss the notification.
        let _ = self.inner.changes.send(change);
    }
}

impl Default for MemoryMissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionStore for MemoryMissionStore {
    fn read_mission(
        &self,
        key: MissionKey,
    ) -> BoxFuture<'static, StorageResult<Option<MissionRecord>>> {
        let result = self
            .guard()
            .map(|()| self.inner.missions.get(key.as_str()).map(|r| r.clone()));
        Box::pin(future::ready(result))
    }

    fn write_mission(
        &self,
        key: MissionKey,
        record: MissionRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.guard().map(|()| {
            self.inner.missions.insert(key.as_str(), record);
            self.notify(StoreChange::Mission);
        });
        Box::pin(future::ready(result))
    }

    fn read_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantRecord>>> {
        let result = self
            .guard()
            .map(|()| self.inner.participants.get(&id).map(|r| r.clone()));
        Box::pin(future::ready(result))
    }

    fn list_participants(&self) -> BoxFuture<'static, StorageResult<Vec<ParticipantRecord>>> {
        let result = self.guard().map(|()| {
            let mut rows: Vec<ParticipantRecord> = self
                .inner
                .participants
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            rows.sort_by(|a, b| {
                a.registered_at
                    .cmp(&b.registered_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            rows
        });
        Box::pin(future::ready(result))
    }

    fn upsert_participant(
        &self,
        record: ParticipantRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.guard().map(|()| {
            let id = record.id;
            self.inner.participants.insert(id, record);
            self.notify(StoreChange::Participant(id));
        });
        Box::pin(future::ready(result))
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(self.guard()))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(self.guard()))
    }
}
