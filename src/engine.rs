//! Engine assembly.
//!
//! Builds every gate once from an `AdGateConfig` and the host-provided
//! collaborators, and wires the coordinator over them. The host keeps the
//! engine for the process lifetime and forwards platform events to it.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AdGateConfig;
use crate::consent::gate::ConsentGate;
use crate::consent::info::{ConsentProvider, FormOutcome};
use crate::frequency::policy::FrequencyPolicy;
use crate::lifecycle::controller::{AdLifecycleController, AdSdk};
use crate::lifecycle::state::{AdStateView, AdSurface, ShowFailure, ShowOutcome};
use crate::logging::structured::LogContext;
use crate::network::monitor::{ConnectivitySource, NetworkQualityMonitor};
use crate::scheduler::PeriodicTask;
use crate::storage::kv::KeyValueStore;
use crate::storage::snapshots::KvFrequencyStore;
use crate::trigger::coordinator::{Gates, TriggerCoordinator};

/// External collaborators supplied by the host app.
#[derive(Clone)]
pub struct Collaborators {
    pub consent_provider: Arc<dyn ConsentProvider>,
    pub ad_sdk: Arc<dyn AdSdk>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct AdGateEngine {
    config: AdGateConfig,
    coordinator: Arc<TriggerCoordinator>,
    rewarded: Arc<AdLifecycleController>,
    app_open: Arc<AdLifecycleController>,
    ctx: LogContext,
}

impl AdGateEngine {
    pub fn new(config: AdGateConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            consent_provider,
            ad_sdk,
            store,
            clock,
        } = collaborators;

        let consent = Arc::new(ConsentGate::with_store(
            config.consent.clone(),
            consent_provider,
            Arc::clone(&clock),
            Arc::clone(&store),
        ));
        let frequency = Arc::new(FrequencyPolicy::new(
            config.frequency.clone(),
            Arc::new(KvFrequencyStore::new(Arc::clone(&store))),
            Arc::clone(&clock),
        ));
        let network =
            NetworkQualityMonitor::with_store(config.network.clone(), Arc::clone(&clock), store);
        let interstitial = Arc::new(AdLifecycleController::new(
            AdSurface::Interstitial,
            Arc::clone(&ad_sdk),
        ));
        let rewarded = Arc::new(AdLifecycleController::new(
            AdSurface::Rewarded,
            Arc::clone(&ad_sdk),
        ));
        let app_open = Arc::new(AdLifecycleController::new(AdSurface::AppOpen, ad_sdk));

        let coordinator = TriggerCoordinator::new(
            config.triggers.clone(),
            config.lifecycle.test_mode,
            Gates {
                consent,
                frequency,
                network,
                interstitial,
            },
            clock,
        )
        .with_companion_surfaces(vec![Arc::clone(&rewarded), Arc::clone(&app_open)]);

        Self {
            config,
            coordinator: Arc::new(coordinator),
            rewarded,
            app_open,
            ctx: LogContext::new("engine"),
        }
    }

    /// Subscribe to connectivity, initialize consent and issue the first
    /// preloads for every surface. Ads are only preloaded when consent
    /// allows requesting them; otherwise the consent form flow does it.
    pub fn start(&self, connectivity: &dyn ConnectivitySource) {
        let gates = self.coordinator.gates();
        gates.network.initialize(connectivity);

        match gates.consent.initialize(&self.config.consent) {
            Ok(info) => log::info!(
                "{} ENGINE_CONSENT_READY status={} can_request_ads={}",
                self.ctx,
                info.status.as_str(),
                info.can_request_ads()
            ),
            Err(e) => log::warn!("{} ENGINE_CONSENT_PENDING error={}", self.ctx, e),
        }

        if gates.consent.can_request_ads() {
            self.coordinator.start();
        } else {
            log::info!("{} ENGINE_PRELOAD_DEFERRED reason=consent", self.ctx);
        }
    }

    /// Present the consent form and, once ads may be requested, preload
    /// every surface that has nothing loaded yet.
    pub fn show_consent_form(&self) -> FormOutcome {
        let outcome = self.coordinator.gates().consent.show_consent_form();
        if outcome.can_request_ads {
            let started = self.coordinator.refill_surfaces();
            log::info!(
                "{} ENGINE_CONSENT_GRANTED shown={} preloads={}",
                self.ctx,
                outcome.shown,
                started
            );
        }
        outcome
    }

    /// Present the privacy options form, then refill if ads are allowed.
    pub fn show_privacy_options(&self) -> bool {
        let shown = self.coordinator.gates().consent.show_privacy_options();
        if shown {
            self.coordinator.refill_surfaces();
        }
        shown
    }

    pub fn coordinator(&self) -> &Arc<TriggerCoordinator> {
        &self.coordinator
    }

    pub fn rewarded(&self) -> &Arc<AdLifecycleController> {
        &self.rewarded
    }

    pub fn app_open(&self) -> &Arc<AdLifecycleController> {
        &self.app_open
    }

    /// Show a rewarded ad on explicit user request. Rewarded ads are
    /// user-initiated, so only consent and readiness apply.
    pub fn show_rewarded(&self) -> ShowOutcome {
        self.show_direct(&self.rewarded)
    }

    /// Show the app-open ad when the host presents its launch or resume
    /// screen. Same gates as rewarded.
    pub fn show_app_open(&self) -> ShowOutcome {
        self.show_direct(&self.app_open)
    }

    fn show_direct(&self, controller: &AdLifecycleController) -> ShowOutcome {
        if !self.coordinator.gates().consent.can_request_ads() {
            log::info!(
                "{} DIRECT_SHOW_DENIED surface={} reason=consent",
                self.ctx,
                controller.surface().as_str()
            );
            return ShowOutcome::failed(ShowFailure::NotReady);
        }
        controller.show_ad()
    }

    /// Start the consent freshness timer and the ad-state refresh timer.
    /// `on_refresh` receives every surface's view on each tick, after queued
    /// SDK events have been applied.
    pub fn start_timers<F>(&self, on_refresh: F) -> std::io::Result<MaintenanceTimers>
    where
        F: Fn(AdSurface, AdStateView) + Send + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);
        let consent_timer = PeriodicTask::spawn(
            "adgate-consent-timer",
            self.config.lifecycle.consent_refresh_interval(),
            move || {
                if coordinator.gates().consent.refresh_if_stale() {
                    coordinator.refill_surfaces();
                }
            },
        )?;

        let surfaces = vec![
            Arc::clone(&self.coordinator.gates().interstitial),
            Arc::clone(&self.rewarded),
            Arc::clone(&self.app_open),
        ];
        let state_timer = PeriodicTask::spawn(
            "adgate-state-refresh",
            self.config.lifecycle.state_refresh_interval(),
            move || {
                for controller in &surfaces {
                    controller.pump_events();
                    on_refresh(controller.surface(), controller.get_state());
                }
            },
        )?;

        Ok(MaintenanceTimers {
            consent_timer,
            state_timer,
        })
    }
}

/// Both periodic timers; dropping this cancels them.
pub struct MaintenanceTimers {
    consent_timer: PeriodicTask,
    state_timer: PeriodicTask,
}

impl MaintenanceTimers {
    pub fn cancel(mut self) {
        self.consent_timer.cancel();
        self.state_timer.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.consent_timer.is_running() && self.state_timer.is_running()
    }
}
