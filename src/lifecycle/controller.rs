//! Per-surface ad lifecycle controller.
//!
//! ```text
//! IDLE    --preload_ad-->   LOADING
//! LOADING --Loaded-->       LOADED
//! LOADING --FailedToLoad--> FAILED
//! LOADED  --show_ad-->      SHOWING
//! SHOWING --Closed-->       IDLE, then preload_ad
//! FAILED  --preload_ad / force_reload--> LOADING
//! ```
//!
//! The SDK is never called with the state lock held, so an adapter may
//! deliver events synchronously from inside `load` or `show`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use parking_lot::Mutex;

use crate::error::{AdLoadError, ProviderError};
use crate::lifecycle::state::{
    AdEvent, AdEventKind, AdState, AdStateView, AdSurface, LoadRequest, Reward, ShowFailure,
    ShowOutcome,
};
use crate::logging::structured::{new_request_id, LogContext};

/// Ad SDK adapter for one or more surfaces.
///
/// Completion is reported asynchronously through `AdEvent`s carrying the
/// request's generation.
pub trait AdSdk: Send + Sync {
    fn load(&self, request: &LoadRequest) -> Result<(), ProviderError>;
    fn show(&self, surface: AdSurface, generation: u64) -> Result<(), ProviderError>;
}

pub type StateListener = Arc<dyn Fn(AdSurface, &AdStateView) + Send + Sync>;

#[derive(Debug)]
struct ControllerState {
    state: AdState,
    /// Bumped on every load attempt; events from older loads are dropped.
    generation: u64,
    test_mode: bool,
    last_reward: Option<Reward>,
    request_id: Option<String>,
}

pub struct AdLifecycleController {
    surface: AdSurface,
    sdk: Arc<dyn AdSdk>,
    state: Mutex<ControllerState>,
    listeners: Mutex<Vec<(u64, StateListener)>>,
    next_listener_id: AtomicU64,
    events_tx: Mutex<mpsc::Sender<AdEvent>>,
    events_rx: Mutex<mpsc::Receiver<AdEvent>>,
    ctx: LogContext,
}

impl AdLifecycleController {
    pub fn new(surface: AdSurface, sdk: Arc<dyn AdSdk>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            surface,
            sdk,
            state: Mutex::new(ControllerState {
                state: AdState::Idle,
                generation: 0,
                test_mode: false,
                last_reward: None,
                request_id: None,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            events_tx: Mutex::new(events_tx),
            events_rx: Mutex::new(events_rx),
            ctx: LogContext::new("lifecycle").with_surface(surface.as_str()),
        }
    }

    pub fn surface(&self) -> AdSurface {
        self.surface
    }

    pub fn state(&self) -> AdState {
        self.state.lock().state.clone()
    }

    pub fn get_state(&self) -> AdStateView {
        AdStateView::from(&self.state.lock().state)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state.lock().state, AdState::Loaded)
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Most recent reward earned on this surface.
    pub fn last_reward(&self) -> Option<Reward> {
        self.state.lock().last_reward.clone()
    }

    /// Sender for SDK callbacks; drain with `pump_events`.
    pub fn event_sender(&self) -> mpsc::Sender<AdEvent> {
        self.events_tx.lock().clone()
    }

    /// Apply every queued SDK event. Returns how many were taken.
    pub fn pump_events(&self) -> usize {
        let pending: Vec<AdEvent> = self.events_rx.lock().try_iter().collect();
        let count = pending.len();
        for event in pending {
            self.handle_event(event);
        }
        count
    }

    /// Start a load unless one is already in flight or an ad is ready.
    pub fn preload_ad(&self, test_mode: bool) {
        let request = {
            let mut st = self.state.lock();
            match st.state {
                AdState::Loading | AdState::Loaded => {
                    log::debug!(
                        "{} AD_PRELOAD_SKIPPED state={}",
                        self.ctx,
                        st.state.as_str()
                    );
                    return;
                }
                AdState::Showing => {
                    log::debug!("{} AD_PRELOAD_SKIPPED state=SHOWING", self.ctx);
                    return;
                }
                AdState::Idle | AdState::Failed(_) => {}
            }
            Self::begin_load(&mut st, self.surface, test_mode)
        };
        self.dispatch_load(request);
    }

    /// Re-enter LOADING from any state. Debug and test flows only.
    pub fn force_reload(&self, test_mode: bool) {
        let request = {
            let mut st = self.state.lock();
            log::info!(
                "{} AD_FORCE_RELOAD previous_state={} previous_generation={}",
                self.ctx,
                st.state.as_str(),
                st.generation
            );
            Self::begin_load(&mut st, self.surface, test_mode)
        };
        self.dispatch_load(request);
    }

    /// Show the loaded ad. Never panics or errors; refusal is a value.
    pub fn show_ad(&self) -> ShowOutcome {
        let generation = {
            let mut st = self.state.lock();
            if st.state != AdState::Loaded {
                log::debug!("{} AD_SHOW_REFUSED state={}", self.ctx, st.state.as_str());
                return ShowOutcome::failed(ShowFailure::NotReady);
            }
            st.state = AdState::Showing;
            st.generation
        };
        self.notify();

        match self.sdk.show(self.surface, generation) {
            Ok(()) => {
                log::info!("{} AD_SHOW_STARTED generation={}", self.ctx, generation);
                ShowOutcome::shown()
            }
            Err(e) => {
                log::warn!("{} AD_SHOW_FAILED error={}", self.ctx, e);
                self.finish_show(generation);
                ShowOutcome::failed(ShowFailure::Sdk(e))
            }
        }
    }

    /// Apply one SDK event. Events from superseded loads are ignored.
    pub fn handle_event(&self, event: AdEvent) {
        let mut finished_show = false;
        {
            let mut st = self.state.lock();
            if event.generation != st.generation {
                log::warn!(
                    "{} AD_EVENT_STALE event={} event_generation={} current_generation={}",
                    self.ctx,
                    event.kind.as_str(),
                    event.generation,
                    st.generation
                );
                return;
            }

            let ctx = match &st.request_id {
                Some(rid) => self.ctx.with_request(rid),
                None => self.ctx.clone(),
            };

            let loading = st.state == AdState::Loading;
            let showing = st.state == AdState::Showing;

            match event.kind {
                AdEventKind::Loaded if loading => {
                    st.state = AdState::Loaded;
                    log::info!("{} AD_LOADED generation={}", ctx, event.generation);
                }
                AdEventKind::FailedToLoad(error) if loading => {
                    log::warn!(
                        "{} AD_LOAD_FAILED code={} message={}",
                        ctx,
                        error.code,
                        error.message
                    );
                    st.state = AdState::Failed(error);
                }
                AdEventKind::Opened if showing => {
                    log::info!("{} AD_OPENED", ctx);
                    return;
                }
                AdEventKind::Clicked if showing => {
                    log::info!("{} AD_CLICKED", ctx);
                    return;
                }
                AdEventKind::UserEarnedReward(reward) if showing => {
                    log::info!(
                        "{} AD_REWARD_EARNED amount={} kind={}",
                        ctx,
                        reward.amount,
                        reward.kind
                    );
                    st.last_reward = Some(reward);
                    return;
                }
                AdEventKind::FailedToShow(error) if showing => {
                    log::warn!("{} AD_SHOW_FAILED error={}", ctx, error);
                    finished_show = true;
                }
                AdEventKind::Closed if showing => {
                    log::info!("{} AD_CLOSED", ctx);
                    finished_show = true;
                }
                kind => {
                    log::warn!(
                        "{} AD_EVENT_UNEXPECTED event={} state={}",
                        ctx,
                        kind.as_str(),
                        st.state.as_str()
                    );
                    return;
                }
            }
        }

        if finished_show {
            self.finish_show(event.generation);
        } else {
            self.notify();
        }
    }

    pub fn add_state_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(AdSurface, &AdStateView) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_state_listener(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// SHOWING -> IDLE, then refill eagerly.
    fn finish_show(&self, generation: u64) {
        let test_mode = {
            let mut st = self.state.lock();
            if st.generation != generation || st.state != AdState::Showing {
                return;
            }
            st.state = AdState::Idle;
            st.test_mode
        };
        self.notify();
        self.preload_ad(test_mode);
    }

    fn begin_load(st: &mut ControllerState, surface: AdSurface, test_mode: bool) -> LoadRequest {
        st.generation += 1;
        st.state = AdState::Loading;
        st.test_mode = test_mode;
        let request_id = new_request_id("load");
        st.request_id = Some(request_id.clone());
        LoadRequest {
            surface,
            test_mode,
            generation: st.generation,
            request_id,
        }
    }

    fn dispatch_load(&self, request: LoadRequest) {
        let ctx = self.ctx.with_request(&request.request_id);
        log::info!(
            "{} AD_LOAD_START generation={} test_mode={}",
            ctx,
            request.generation,
            request.test_mode
        );
        self.notify();

        if let Err(e) = self.sdk.load(&request) {
            let mut st = self.state.lock();
            if st.generation == request.generation && st.state == AdState::Loading {
                log::warn!("{} AD_LOAD_FAILED code={} message={}", ctx, e.code, e.message);
                st.state = AdState::Failed(AdLoadError::from(e));
            } else {
                return;
            }
            drop(st);
            self.notify();
        }
    }

    fn notify(&self) {
        let view = self.get_state();
        let listeners: Vec<(u64, StateListener)> = self.listeners.lock().clone();
        for (id, listener) in listeners {
            let surface = self.surface;
            if catch_unwind(AssertUnwindSafe(|| listener(surface, &view))).is_err() {
                log::error!("{} AD_STATE_LISTENER_PANICKED listener_id={}", self.ctx, id);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// SDK double that records calls and completes nothing on its own.
    #[derive(Default)]
    pub struct RecordingSdk {
        pub loads: Mutex<Vec<LoadRequest>>,
        pub shows: Mutex<Vec<(AdSurface, u64)>>,
        pub fail_load: Mutex<Option<ProviderError>>,
        pub fail_show: Mutex<Option<ProviderError>>,
    }

    impl RecordingSdk {
        pub fn load_count(&self) -> usize {
            self.loads.lock().len()
        }

        pub fn last_generation(&self) -> u64 {
            self.loads.lock().last().map(|r| r.generation).unwrap_or(0)
        }
    }

    impl AdSdk for RecordingSdk {
        fn load(&self, request: &LoadRequest) -> Result<(), ProviderError> {
            self.loads.lock().push(request.clone());
            match self.fail_load.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn show(&self, surface: AdSurface, generation: u64) -> Result<(), ProviderError> {
            self.shows.lock().push((surface, generation));
            match self.fail_show.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    /// Controller plus SDK, loaded and ready to show.
    pub fn loaded_controller(
        surface: AdSurface,
    ) -> (Arc<AdLifecycleController>, Arc<RecordingSdk>) {
        let sdk = Arc::new(RecordingSdk::default());
        let controller = Arc::new(AdLifecycleController::new(surface, sdk.clone()));
        controller.preload_ad(true);
        controller.handle_event(AdEvent::new(sdk.last_generation(), AdEventKind::Loaded));
        (controller, sdk)
    }
}
