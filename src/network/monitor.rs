//! Network quality monitor.
//!
//! Subscribes to the platform connectivity signal, keeps a cached
//! `NetworkState`, and notifies listeners synchronously on every
//! transition. Cloning the monitor clones a handle to the same state.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::NetworkConfig;
use crate::error::ProviderError;
use crate::logging::structured::LogContext;
use crate::network::state::{ConnectivitySnapshot, NetworkState};
use crate::storage::kv::{KeyValueStore, NETWORK_STATE_KEY};
use crate::storage::snapshots::SnapshotStore;

pub type ConnectivityCallback = Box<dyn Fn(ConnectivitySnapshot) + Send + Sync>;
pub type NetworkListener = Arc<dyn Fn(&NetworkState) + Send + Sync>;

/// Platform connectivity signal.
pub trait ConnectivitySource {
    /// Current connectivity, on demand.
    fn fetch(&self) -> Result<ConnectivitySnapshot, ProviderError>;
    /// Register `callback` for every subsequent change.
    fn subscribe(&self, callback: ConnectivityCallback) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuitabilityReason {
    Unknown,
    NoConnection,
    InternetUnreachable,
    WeakSignal,
    UnstableConnection,
    Suitable,
}

impl SuitabilityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuitabilityReason::Unknown => "network state unknown",
            SuitabilityReason::NoConnection => "no connection",
            SuitabilityReason::InternetUnreachable => "internet unreachable",
            SuitabilityReason::WeakSignal => "weak signal",
            SuitabilityReason::UnstableConnection => "unstable connection",
            SuitabilityReason::Suitable => "network suitable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Suitability {
    pub suitable: bool,
    pub reason: SuitabilityReason,
    /// In [0, 1].
    pub confidence: f64,
}

impl Suitability {
    fn unsuitable(reason: SuitabilityReason, confidence: f64) -> Self {
        Self {
            suitable: false,
            reason,
            confidence,
        }
    }
}

struct MonitorState {
    network: NetworkState,
    /// Set once a live snapshot has been applied.
    observed: bool,
}

struct MonitorInner {
    config: NetworkConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
    listeners: Mutex<Vec<(u64, NetworkListener)>>,
    next_listener_id: AtomicU64,
    snapshot: Option<SnapshotStore<NetworkState>>,
    ctx: LogContext,
}

#[derive(Clone)]
pub struct NetworkQualityMonitor {
    inner: Arc<MonitorInner>,
}

/// Returned by `add_listener`; removes the listener when consumed.
pub struct ListenerHandle {
    id: u64,
    inner: Weak<MonitorInner>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl NetworkQualityMonitor {
    pub fn new(config: NetworkConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, None)
    }

    /// Monitor that restores its last snapshot (including history) from
    /// `store` and persists every transition back to it.
    pub fn with_store(
        config: NetworkConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::build(config, clock, Some(SnapshotStore::new(store, NETWORK_STATE_KEY)))
    }

    fn build(
        config: NetworkConfig,
        clock: Arc<dyn Clock>,
        snapshot: Option<SnapshotStore<NetworkState>>,
    ) -> Self {
        let ctx = LogContext::new("network");
        let mut network = NetworkState::default();

        if let Some(slot) = &snapshot {
            match slot.load() {
                Ok(Some(mut restored)) => {
                    restored.connection_history.truncate(config.history_capacity);
                    log::info!(
                        "{} NETWORK_STATE_RESTORED connected={} history={}",
                        ctx,
                        restored.is_connected,
                        restored.connection_history.len()
                    );
                    network = restored;
                }
                Ok(None) => {}
                Err(e) => log::warn!("{} STORAGE_READ_FAILED error={}", ctx, e),
            }
        }

        Self {
            inner: Arc::new(MonitorInner {
                config,
                clock,
                state: Mutex::new(MonitorState {
                    network,
                    observed: false,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                snapshot,
                ctx,
            }),
        }
    }

    /// Subscribe to `source` and take an initial snapshot.
    ///
    /// Failures are logged only; until a snapshot arrives the network is
    /// reported as unknown and unsuitable.
    pub fn initialize(&self, source: &dyn ConnectivitySource) {
        let weak = Arc::downgrade(&self.inner);
        let subscribed = source.subscribe(Box::new(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                NetworkQualityMonitor { inner }.handle_change(snapshot);
            }
        }));
        if let Err(e) = subscribed {
            log::warn!("{} NETWORK_SUBSCRIBE_FAILED error={}", self.inner.ctx, e);
        }

        match source.fetch() {
            Ok(snapshot) => self.apply(snapshot, Some("initial snapshot")),
            Err(e) => log::warn!("{} NETWORK_FETCH_FAILED error={}", self.inner.ctx, e),
        }
    }

    /// Entry point for platform change events.
    pub fn handle_change(&self, snapshot: ConnectivitySnapshot) {
        self.apply(snapshot, None);
    }

    pub fn get_state(&self) -> NetworkState {
        self.inner.state.lock().network.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().observed
    }

    pub fn is_network_suitable_for_ads(&self) -> Suitability {
        let now = self.inner.clock.now();
        let config = &self.inner.config;
        let state = self.inner.state.lock();
        let network = &state.network;

        if !state.observed {
            return Suitability::unsuitable(SuitabilityReason::Unknown, 0.0);
        }
        if !network.is_connected {
            return Suitability::unsuitable(SuitabilityReason::NoConnection, 1.0);
        }
        if !network.is_internet_reachable {
            return Suitability::unsuitable(SuitabilityReason::InternetUnreachable, 0.9);
        }
        if network.strength < config.min_strength {
            return Suitability::unsuitable(SuitabilityReason::WeakSignal, 0.8);
        }
        let disconnects = network.disconnects_within(now, config.flapping_window());
        if disconnects > config.max_disconnects_in_window {
            log::debug!(
                "{} NETWORK_FLAPPING disconnects={} window_ms={}",
                self.inner.ctx,
                disconnects,
                config.flapping_window_ms
            );
            return Suitability::unsuitable(SuitabilityReason::UnstableConnection, 0.7);
        }

        Suitability {
            suitable: true,
            reason: SuitabilityReason::Suitable,
            confidence: network.strength,
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn apply(&self, snapshot: ConnectivitySnapshot, reason: Option<&str>) {
        let inner = &self.inner;
        let now = inner.clock.now();

        let network = {
            let mut state = inner.state.lock();
            state
                .network
                .apply(&snapshot, now, reason, inner.config.history_capacity);
            state.observed = true;
            state.network.clone()
        };

        log::info!(
            "{} NETWORK_TRANSITION connected={} reachable={} type={} strength={:.2}",
            inner.ctx,
            network.is_connected,
            network.is_internet_reachable,
            network.connection_type.as_str(),
            network.strength
        );

        if let Some(slot) = &inner.snapshot {
            if let Err(e) = slot.save(&network) {
                log::warn!("{} STORAGE_WRITE_FAILED error={}", inner.ctx, e);
            }
        }

        // Snapshot the list so listeners may unsubscribe while being called.
        let listeners: Vec<(u64, NetworkListener)> = inner.listeners.lock().clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&network))).is_err() {
                log::error!("{} NETWORK_LISTENER_PANICKED listener_id={}", inner.ctx, id);
            }
        }
    }
}
