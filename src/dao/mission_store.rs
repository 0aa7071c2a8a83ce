//! Abstraction over the shared state store.
//!
//! The store is the single source of truth for phase and participant state:
//! anything learned from the broadcast channel is provisional until a store
//! read confirms it.

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::{
    models::{MissionRecord, ParticipantRecord},
    storage::StorageResult,
};

/// Name of a singleton record in the store.
///
/// The mission timeline is a single shared row; callers address it through an
/// explicit key handed to the adapter instead of a magic id buried in call
/// sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MissionKey(&'static str);

impl MissionKey {
    /// Build a key from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Raw key name used by backends for addressing.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// The one mission timeline record this crate coordinates around.
pub const MISSION_SINGLETON: MissionKey = MissionKey::new("mission-timeline");

/// Change notification emitted by a store backend.
///
/// Delivery is best effort: notifications may be dropped under load, so every
/// consumer also polls. A notification carries no record data; receivers
/// re-read the store so the read path stays the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// The mission singleton was written.
    Mission,
    /// A participant record was inserted or updated.
    Participant(Uuid),
}

/// Abstraction over the shared state store for mission and participant records.
///
/// Writes are full replacements of the addressed record, never partial
/// increments, so concurrent last-write-wins can reorder but not corrupt.
pub trait MissionStore: Send + Sync {
    /// Read the mission singleton, `None` before bootstrap.
    fn read_mission(
        &self,
        key: MissionKey,
    ) -> BoxFuture<'static, StorageResult<Option<MissionRecord>>>;

    /// Replace the mission singleton.
    fn write_mission(
        &self,
        key: MissionKey,
        record: MissionRecord,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Read one participant record.
    fn read_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantRecord>>>;

    /// List every participant, ordered by registration time.
    fn list_participants(&self) -> BoxFuture<'static, StorageResult<Vec<ParticipantRecord>>>;

    /// Insert or fully replace a participant record.
    fn upsert_participant(
        &self,
        record: ParticipantRecord,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Subscribe to best-effort change notifications.
    fn changes(&self) -> broadcast::Receiver<StoreChange>;

    /// Probe backend liveness.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
