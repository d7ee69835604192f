//! Consent gate.
//!
//! State only changes on results from the consent SDK. A failed SDK call is
//! non-fatal: the gate still reports itself initialized and answers from
//! the last known info, or from a closed fallback.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{elapsed_between, Clock};
use crate::config::ConsentSettings;
use crate::consent::info::{ConsentInfo, ConsentProvider, ConsentStatus, FormOutcome};
use crate::error::ConsentError;
use crate::logging::structured::LogContext;
use crate::{log_info, log_warn};
use crate::storage::kv::{KeyValueStore, CONSENT_INFO_KEY};
use crate::storage::snapshots::SnapshotStore;

#[derive(Debug)]
struct GateState {
    info: Option<ConsentInfo>,
    initialized: bool,
    initializing: bool,
    last_config: ConsentSettings,
}

pub struct ConsentGate {
    provider: Arc<dyn ConsentProvider>,
    clock: Arc<dyn Clock>,
    settings: ConsentSettings,
    state: Mutex<GateState>,
    snapshot: Option<SnapshotStore<ConsentInfo>>,
    ctx: LogContext,
}

impl ConsentGate {
    pub fn new(
        settings: ConsentSettings,
        provider: Arc<dyn ConsentProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(settings, provider, clock, None)
    }

    /// Gate that rehydrates the last `ConsentInfo` from `store` and
    /// persists every update back to it.
    pub fn with_store(
        settings: ConsentSettings,
        provider: Arc<dyn ConsentProvider>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::build(settings, provider, clock, Some(SnapshotStore::new(store, CONSENT_INFO_KEY)))
    }

    fn build(
        settings: ConsentSettings,
        provider: Arc<dyn ConsentProvider>,
        clock: Arc<dyn Clock>,
        snapshot: Option<SnapshotStore<ConsentInfo>>,
    ) -> Self {
        let ctx = LogContext::new("consent");
        let info = snapshot.as_ref().and_then(|slot| match slot.load() {
            Ok(info) => info,
            Err(e) => {
                log::warn!("{} STORAGE_READ_FAILED error={}", ctx, e);
                None
            }
        });
        if let Some(info) = &info {
            log::info!(
                "{} CONSENT_RESTORED status={} last_updated={}",
                ctx,
                info.status.as_str(),
                info.last_updated.to_rfc3339()
            );
        }

        Self {
            provider,
            clock,
            state: Mutex::new(GateState {
                info,
                initialized: false,
                initializing: false,
                last_config: settings.clone(),
            }),
            settings,
            snapshot,
            ctx,
        }
    }

    /// Request a consent-info update from the SDK.
    ///
    /// Only fails when another initialization is still running. An SDK
    /// failure resolves to the cached info or the closed fallback.
    pub fn initialize(&self, config: &ConsentSettings) -> Result<ConsentInfo, ConsentError> {
        {
            let mut state = self.state.lock();
            if state.initializing {
                log_warn!(self.ctx, "CONSENT_INIT_REJECTED", reason = "in_progress");
                return Err(ConsentError::InitializationInProgress);
            }
            state.initializing = true;
            state.last_config = config.clone();
        }

        log::debug!(
            "{} CONSENT_INIT_START debug_geography={:?} test_devices={}",
            self.ctx,
            config.debug_geography,
            config.test_device_ids.len()
        );
        let result = self.provider.request_consent_info_update(config);
        let now = self.clock.now();

        let mut state = self.state.lock();
        state.initializing = false;
        state.initialized = true;

        match result {
            Ok(update) => {
                let info = ConsentInfo::new(update, now);
                log::info!(
                    "{} CONSENT_INITIALIZED status={} can_request_ads={} location={}",
                    self.ctx,
                    info.status.as_str(),
                    info.can_request_ads(),
                    info.user_location
                );
                self.persist(&info);
                state.info = Some(info.clone());
                Ok(info)
            }
            Err(e) => {
                let fallback = state
                    .info
                    .clone()
                    .unwrap_or_else(|| ConsentInfo::fallback(now));
                log::warn!(
                    "{} CONSENT_INIT_FAILED error={} using_status={}",
                    self.ctx,
                    e,
                    fallback.status.as_str()
                );
                Ok(fallback)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn can_request_ads(&self) -> bool {
        self.state
            .lock()
            .info
            .as_ref()
            .map(|i| i.can_request_ads())
            .unwrap_or(false)
    }

    pub fn needs_consent_form(&self) -> bool {
        self.status() == ConsentStatus::Required
    }

    pub fn is_privacy_options_required(&self) -> bool {
        self.state
            .lock()
            .info
            .as_ref()
            .map(|i| i.is_privacy_options_required)
            .unwrap_or(false)
    }

    pub fn status(&self) -> ConsentStatus {
        self.state
            .lock()
            .info
            .as_ref()
            .map(|i| i.status)
            .unwrap_or(ConsentStatus::Unknown)
    }

    /// Cached info, or the closed fallback when nothing is cached.
    pub fn info(&self) -> ConsentInfo {
        self.state
            .lock()
            .info
            .clone()
            .unwrap_or_else(|| ConsentInfo::fallback(self.clock.now()))
    }

    /// True when nothing is cached or the cache is older than the TTL.
    pub fn is_stale(&self) -> bool {
        let now = self.clock.now();
        match &self.state.lock().info {
            Some(info) => elapsed_between(info.last_updated, now) > self.settings.cache_ttl(),
            None => true,
        }
    }

    /// Re-run initialization if the cache has gone stale. Called when the
    /// app returns to the foreground and from the freshness timer.
    ///
    /// Returns whether a refresh was attempted.
    pub fn refresh_if_stale(&self) -> bool {
        if !self.is_stale() {
            return false;
        }
        let config = self.state.lock().last_config.clone();
        log::info!("{} CONSENT_REFRESH_STALE", self.ctx);
        match self.initialize(&config) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("{} CONSENT_REFRESH_SKIPPED error={}", self.ctx, e);
                false
            }
        }
    }

    /// Run `refresh_if_stale` on a short-lived worker so the caller never
    /// waits on the consent SDK. Returns whether a worker was started.
    pub fn spawn_refresh_if_stale(self: &Arc<Self>) -> bool {
        if !self.is_stale() || self.state.lock().initializing {
            return false;
        }
        let gate = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("adgate-consent-refresh".to_string())
            .spawn(move || {
                gate.refresh_if_stale();
            });
        match spawned {
            Ok(_) => true,
            Err(e) => {
                log::warn!("{} CONSENT_REFRESH_SPAWN_FAILED error={}", self.ctx, e);
                false
            }
        }
    }

    /// Present the consent form when the SDK says one is required.
    pub fn show_consent_form(&self) -> FormOutcome {
        if !self.needs_consent_form() {
            return FormOutcome {
                shown: false,
                can_request_ads: self.can_request_ads(),
            };
        }

        match self.provider.show_form() {
            Ok(result) => {
                let info = self.update_status(result.status);
                log::info!(
                    "{} CONSENT_FORM_COMPLETED shown={} status={}",
                    self.ctx,
                    result.shown,
                    info.status.as_str()
                );
                FormOutcome {
                    shown: result.shown,
                    can_request_ads: info.can_request_ads(),
                }
            }
            Err(e) => {
                log::warn!("{} CONSENT_FORM_FAILED error={}", self.ctx, e);
                FormOutcome {
                    shown: false,
                    can_request_ads: self.can_request_ads(),
                }
            }
        }
    }

    /// Present the privacy options form. Returns whether it succeeded.
    pub fn show_privacy_options(&self) -> bool {
        match self.provider.show_privacy_options_form() {
            Ok(result) if result.success => {
                let info = self.update_status(result.status);
                log::info!(
                    "{} PRIVACY_OPTIONS_COMPLETED status={}",
                    self.ctx,
                    info.status.as_str()
                );
                true
            }
            Ok(_) => {
                log::info!("{} PRIVACY_OPTIONS_NOT_SHOWN", self.ctx);
                false
            }
            Err(e) => {
                log::warn!("{} PRIVACY_OPTIONS_FAILED error={}", self.ctx, e);
                false
            }
        }
    }

    /// Forget everything and return to UNKNOWN. Debug flows only.
    pub fn reset_consent(&self) {
        {
            let mut state = self.state.lock();
            state.info = None;
            state.initialized = false;
        }
        if let Some(slot) = &self.snapshot {
            if let Err(e) = slot.clear() {
                log::warn!("{} STORAGE_WRITE_FAILED error={}", self.ctx, e);
            }
        }
        log_info!(self.ctx, "CONSENT_RESET");
    }

    fn update_status(&self, status: ConsentStatus) -> ConsentInfo {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let info = match &state.info {
            Some(info) => info.with_status(status, now),
            None => ConsentInfo::fallback(now).with_status(status, now),
        };
        self.persist(&info);
        state.info = Some(info.clone());
        info
    }

    fn persist(&self, info: &ConsentInfo) {
        if let Some(slot) = &self.snapshot {
            if let Err(e) = slot.save(info) {
                log::warn!("{} STORAGE_WRITE_FAILED error={}", self.ctx, e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::consent::info::{ConsentUpdate, FormResult, PrivacyOptionsResult};
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Consent SDK double with scripted responses.
    pub struct ScriptedConsent {
        pub update: Mutex<Result<ConsentUpdate, ProviderError>>,
        pub form_status: Mutex<ConsentStatus>,
        pub requests: AtomicUsize,
        /// Added latency for every consent-info update.
        pub delay: Mutex<Duration>,
    }

    impl ScriptedConsent {
        pub fn with_status(status: ConsentStatus) -> Self {
            Self {
                update: Mutex::new(Ok(ConsentUpdate {
                    status,
                    is_privacy_options_required: status == ConsentStatus::Obtained,
                    user_location: "EEA".to_string(),
                })),
                form_status: Mutex::new(ConsentStatus::Obtained),
                requests: AtomicUsize::new(0),
                delay: Mutex::new(Duration::ZERO),
            }
        }

        pub fn failing() -> Self {
            let provider = Self::with_status(ConsentStatus::Unknown);
            *provider.update.lock() = Err(ProviderError::new(2, "timeout"));
            provider
        }

        pub fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl ConsentProvider for ScriptedConsent {
        fn request_consent_info_update(
            &self,
            _config: &ConsentSettings,
        ) -> Result<ConsentUpdate, ProviderError> {
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.update.lock().clone()
        }

        fn show_form(&self) -> Result<FormResult, ProviderError> {
            Ok(FormResult {
                shown: true,
                status: *self.form_status.lock(),
            })
        }

        fn show_privacy_options_form(&self) -> Result<PrivacyOptionsResult, ProviderError> {
            Ok(PrivacyOptionsResult {
                success: true,
                status: *self.form_status.lock(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedConsent;
    use super::*;
    use crate::clock::ManualClock;
    use crate::consent::info::{ConsentUpdate, FormResult, PrivacyOptionsResult};
    use crate::error::ProviderError;
    use crate::storage::kv::testing::FailingStore;
    use crate::storage::kv::MemoryStore;
    use std::sync::mpsc;
    use std::time::Duration;

    fn gate_with(provider: Arc<ScriptedConsent>) -> (ConsentGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        (
            ConsentGate::new(ConsentSettings::default(), provider, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_obtained_allows_ads() {
        let provider = ScriptedConsent::with_status(ConsentStatus::Obtained);
        let (gate, _clock) = gate_with(Arc::new(provider));
        let info = gate.initialize(&ConsentSettings::default()).unwrap();
        assert_eq!(info.status, ConsentStatus::Obtained);
        assert!(gate.can_request_ads());
        assert!(gate.is_initialized());
        assert!(!gate.needs_consent_form());
    }

    #[test]
    fn test_required_blocks_until_form_completed() {
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::Required));
        let (gate, _clock) = gate_with(provider);
        gate.initialize(&ConsentSettings::default()).unwrap();
        assert!(gate.needs_consent_form());
        assert!(!gate.can_request_ads());

        let outcome = gate.show_consent_form();
        assert!(outcome.shown);
        assert!(outcome.can_request_ads);
        assert!(gate.can_request_ads());
        assert!(!gate.needs_consent_form());
    }

    #[test]
    fn test_form_not_shown_when_not_required() {
        let provider = ScriptedConsent::with_status(ConsentStatus::NotRequired);
        let (gate, _clock) = gate_with(Arc::new(provider));
        gate.initialize(&ConsentSettings::default()).unwrap();
        let outcome = gate.show_consent_form();
        assert!(!outcome.shown);
        assert!(outcome.can_request_ads);
    }

    #[test]
    fn test_failure_fails_closed_but_initialized() {
        let (gate, _clock) = gate_with(Arc::new(ScriptedConsent::failing()));
        let info = gate.initialize(&ConsentSettings::default()).unwrap();
        assert_eq!(info.status, ConsentStatus::Unknown);
        assert!(!info.can_request_ads());
        assert!(gate.is_initialized());
        assert!(!gate.can_request_ads());
    }

    #[test]
    fn test_failure_keeps_last_known_info() {
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::Obtained));
        let (gate, _clock) = gate_with(provider.clone());
        gate.initialize(&ConsentSettings::default()).unwrap();

        *provider.update.lock() = Err(ProviderError::new(2, "timeout"));
        let info = gate.initialize(&ConsentSettings::default()).unwrap();
        assert_eq!(info.status, ConsentStatus::Obtained);
        assert!(gate.can_request_ads());
    }

    #[test]
    fn test_refresh_only_when_stale() {
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::Obtained));
        let (gate, clock) = gate_with(provider.clone());
        gate.initialize(&ConsentSettings::default()).unwrap();

        clock.advance(Duration::from_secs(30 * 60));
        assert!(!gate.refresh_if_stale());
        assert_eq!(provider.request_count(), 1);

        clock.advance(Duration::from_secs(31 * 60));
        assert!(gate.is_stale());
        assert!(gate.refresh_if_stale());
        assert_eq!(provider.request_count(), 2);
        assert!(!gate.is_stale());
    }

    #[test]
    fn test_reset_returns_to_unknown() {
        let provider = ScriptedConsent::with_status(ConsentStatus::Obtained);
        let (gate, _clock) = gate_with(Arc::new(provider));
        gate.initialize(&ConsentSettings::default()).unwrap();
        gate.reset_consent();
        assert_eq!(gate.status(), ConsentStatus::Unknown);
        assert!(!gate.can_request_ads());
        assert!(!gate.is_initialized());
    }

    #[test]
    fn test_privacy_options_updates_status() {
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::Obtained));
        *provider.form_status.lock() = ConsentStatus::Required;
        let (gate, _clock) = gate_with(provider);
        gate.initialize(&ConsentSettings::default()).unwrap();
        assert!(gate.is_privacy_options_required());

        assert!(gate.show_privacy_options());
        assert_eq!(gate.status(), ConsentStatus::Required);
        assert!(!gate.can_request_ads());
    }

    #[test]
    fn test_snapshot_rehydrates_on_restart() {
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::NotRequired));
        let first = ConsentGate::with_store(
            ConsentSettings::default(),
            provider.clone(),
            clock.clone(),
            store.clone(),
        );
        first.initialize(&ConsentSettings::default()).unwrap();

        let restored = ConsentGate::with_store(ConsentSettings::default(), provider, clock, store);
        assert_eq!(restored.status(), ConsentStatus::NotRequired);
        assert!(restored.can_request_ads());
        assert!(!restored.is_initialized());
    }

    struct BlockingConsent {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ConsentProvider for BlockingConsent {
        fn request_consent_info_update(
            &self,
            _config: &ConsentSettings,
        ) -> Result<ConsentUpdate, ProviderError> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            Ok(ConsentUpdate {
                status: ConsentStatus::Obtained,
                is_privacy_options_required: false,
                user_location: "US".to_string(),
            })
        }

        fn show_form(&self) -> Result<FormResult, ProviderError> {
            Err(ProviderError::new(0, "unused"))
        }

        fn show_privacy_options_form(&self) -> Result<PrivacyOptionsResult, ProviderError> {
            Err(ProviderError::new(0, "unused"))
        }
    }

    #[test]
    fn test_concurrent_initialize_rejected() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let provider = Arc::new(BlockingConsent {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        let gate = Arc::new(ConsentGate::new(ConsentSettings::default(), provider, clock));

        let worker = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.initialize(&ConsentSettings::default()))
        };
        entered_rx.recv().unwrap();

        assert_eq!(
            gate.initialize(&ConsentSettings::default()),
            Err(ConsentError::InitializationInProgress)
        );
        assert!(!gate.can_request_ads());

        release_tx.send(()).unwrap();
        let first = worker.join().unwrap().unwrap();
        assert_eq!(first.status, ConsentStatus::Obtained);
        assert!(gate.can_request_ads());
    }
    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_background_refresh_does_not_block_caller() {
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::Obtained));
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        let gate = Arc::new(ConsentGate::new(
            ConsentSettings::default(),
            provider.clone(),
            clock.clone(),
        ));
        gate.initialize(&ConsentSettings::default()).unwrap();
        assert!(!gate.spawn_refresh_if_stale());

        *provider.delay.lock() = Duration::from_millis(500);
        clock.advance(Duration::from_secs(2 * 60 * 60));
        let started = std::time::Instant::now();
        assert!(gate.spawn_refresh_if_stale());
        assert!(started.elapsed() < Duration::from_millis(200));

        // Cached answer stays available while the refresh runs.
        assert!(gate.can_request_ads());
        assert!(wait_until(|| provider.request_count() == 2));
        assert!(wait_until(|| !gate.is_stale()));
    }

    #[test]
    fn test_failing_store_keeps_in_memory_consent() {
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        let provider = Arc::new(ScriptedConsent::with_status(ConsentStatus::Required));
        let gate = ConsentGate::with_store(
            ConsentSettings::default(),
            provider,
            clock,
            Arc::new(FailingStore),
        );
        assert_eq!(gate.status(), ConsentStatus::Unknown);

        let info = gate.initialize(&ConsentSettings::default()).unwrap();
        assert_eq!(info.status, ConsentStatus::Required);
        assert!(gate.needs_consent_form());

        let outcome = gate.show_consent_form();
        assert!(outcome.shown && outcome.can_request_ads);
        assert_eq!(gate.status(), ConsentStatus::Obtained);

        gate.reset_consent();
        assert!(!gate.can_request_ads());
    }
}
