//! Per-client runtime state.

pub mod clock;
pub mod display;
pub mod reveal;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use crate::{
    bus::BroadcastChannel,
    config::MissionConfig,
    dao::{mission_store::MissionStore, models::MissionRecord},
    services::launch::LaunchSession,
};

pub use self::clock::{ClockSyncEngine, OffsetSource};
pub use self::display::PhaseDisplay;
pub use self::state_machine::{InvalidTransition, PhaseEvent, PhaseStateMachine};

/// Shared handle to a mission node.
pub type SharedNode = Arc<MissionNode>;

/// What this client is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single authority over the mission timeline.
    Director,
    /// A competing pilot owning one participant record.
    Pilot(Uuid),
    /// A judge editing scoring inputs.
    Judge,
    /// A read-only observer.
    Spectator,
}

impl Role {
    /// Whether this node drives the timeline.
    pub fn is_director(self) -> bool {
        matches!(self, Role::Director)
    }

    /// The owned participant id, for pilot nodes.
    pub fn participant_id(self) -> Option<Uuid> {
        match self {
            Role::Pilot(id) => Some(id),
            _ => None,
        }
    }
}

/// Central per-client state: adapter handles, the clock estimate, the local
/// timeline view, and the launch-session slots for both protocol sides.
pub struct MissionNode {
    config: MissionConfig,
    role: Role,
    store: RwLock<Option<Arc<dyn MissionStore>>>,
    bus: RwLock<Option<Arc<dyn BroadcastChannel>>>,
    clock: ClockSyncEngine,
    timeline: RwLock<PhaseStateMachine>,
    display: watch::Sender<PhaseDisplay>,
    degraded: watch::Sender<bool>,
    /// Director side: the currently open launch session, if any.
    launch: Mutex<Option<LaunchSession>>,
    /// Participant side: locally computed offset per probed session, kept as
    /// the fallback when a commit omits this participant.
    probe_offsets: DashMap<Uuid, i64>,
}

impl MissionNode {
    /// Construct a node wrapped in an [`Arc`] so tasks can clone it cheaply.
    ///
    /// The node starts in degraded mode until a store backend is installed.
    pub fn new(role: Role, config: MissionConfig) -> SharedNode {
        let (degraded_tx, _rx) = watch::channel(true);
        let (display_tx, _rx) = watch::channel(PhaseDisplay::idle());
        let clock = ClockSyncEngine::new(&config, role.is_director());
        Arc::new(Self {
            config,
            role,
            store: RwLock::new(None),
            bus: RwLock::new(None),
            clock,
            timeline: RwLock::new(PhaseStateMachine::new()),
            display: display_tx,
            degraded: degraded_tx,
            launch: Mutex::new(None),
            probe_offsets: DashMap::new(),
        })
    }

    /// Mission configuration.
    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    /// Role of this node.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The clock sync engine.
    pub fn clock(&self) -> &ClockSyncEngine {
        &self.clock
    }

    /// Obtain a handle to the current store backend, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn MissionStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a store backend and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn MissionStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the store backend and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Whether the node currently has no store backend.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub(crate) async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }
        let _ = self.degraded.send(value);
    }

    /// Obtain a handle to the broadcast channel, if one is installed.
    pub async fn bus(&self) -> Option<Arc<dyn BroadcastChannel>> {
        let guard = self.bus.read().await;
        guard.as_ref().cloned()
    }

    /// Install the broadcast channel. Without one the clock degrades to
    /// passive inference and synchronized launches are unavailable.
    pub async fn install_bus(&self, bus: Arc<dyn BroadcastChannel>) {
        let mut guard = self.bus.write().await;
        *guard = Some(bus);
    }

    /// Local view of the mission timeline.
    pub fn timeline(&self) -> &RwLock<PhaseStateMachine> {
        &self.timeline
    }

    /// Snapshot of the locally-held mission record.
    pub async fn mission_record(&self) -> MissionRecord {
        self.timeline.read().await.record().clone()
    }

    /// Latest derived display value.
    pub fn current_display(&self) -> PhaseDisplay {
        self.display.borrow().clone()
    }

    /// Watch the derived display; updated at the display tick.
    pub fn display_watcher(&self) -> watch::Receiver<PhaseDisplay> {
        self.display.subscribe()
    }

    /// The display feed as a stream, for UI layers that consume streams.
    pub fn display_stream(&self) -> WatchStream<PhaseDisplay> {
        WatchStream::new(self.display.subscribe())
    }

    /// Publish a freshly derived display if it changed.
    pub(crate) fn push_display(&self, display: PhaseDisplay) {
        self.display.send_if_modified(|current| {
            if *current == display {
                false
            } else {
                *current = display;
                true
            }
        });
    }

    /// Director-side launch session slot.
    pub(crate) fn launch_slot(&self) -> &Mutex<Option<LaunchSession>> {
        &self.launch
    }

    /// Participant-side per-session offset memory.
    pub(crate) fn probe_offsets(&self) -> &DashMap<Uuid, i64> {
        &self.probe_offsets
    }
}
