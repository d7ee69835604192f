//! AdGate Core - Ad admission control for mobile apps
//!
//! This crate decides whether, when and under what conditions an
//! advertisement may be loaded and shown. The implementation prioritizes:
//!
//! 1. **Compliance** - Ads are never requested without consent
//! 2. **Logging** - Every admission decision logged with full context
//! 3. **Resilience** - SDK, storage and listener failures never escape
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `network` - Connectivity history and suitability assessment
//! - `consent` - Privacy consent state and forms
//! - `frequency` - Persisted interstitial pacing policy
//! - `lifecycle` - Per-surface load/show state machine
//! - `trigger` - Navigation/resume triggers and the admission decision
//! - `engine` - Wires every gate from one configuration
//! - `scheduler` - Cancellable periodic timers
//! - `storage` - Key-value persistence and JSON snapshots
//! - `config` - Tunables with defaults
//! - `logging` - Structured logging with request context

pub mod clock;
pub mod config;
pub mod consent;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod scheduler;
pub mod storage;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdGateConfig;
pub use consent::{ConsentGate, ConsentProvider, ConsentStatus};
pub use engine::{AdGateEngine, Collaborators, MaintenanceTimers};
pub use error::{AdLoadError, ConfigError, ConsentError, ProviderError, StorageError};
pub use frequency::{FrequencyDecision, FrequencyPolicy};
pub use lifecycle::{AdEvent, AdEventKind, AdLifecycleController, AdSdk, AdState, AdSurface};
pub use network::{ConnectivitySnapshot, ConnectivitySource, NetworkQualityMonitor, Suitability};
pub use storage::{KeyValueStore, MemoryStore};
pub use trigger::{AdmissionDecision, AppState, TriggerCoordinator, TriggerKind, TriggerOutcome};

/// Initialize the process-wide logger.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}
