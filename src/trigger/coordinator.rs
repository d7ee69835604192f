//! Trigger coordinator.
//!
//! Owns the per-trigger windows (navigation counter, resume budget, their
//! cooldowns) and turns navigation, app-state and session-end signals into
//! show attempts. A fired trigger spends its window whether or not the
//! admission check lets the ad through.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::{elapsed_between, Clock};
use crate::config::TriggerConfig;
use crate::consent::gate::ConsentGate;
use crate::consent::info::ConsentStatus;
use crate::frequency::data::FrequencyData;
use crate::frequency::policy::FrequencyPolicy;
use crate::lifecycle::controller::AdLifecycleController;
use crate::lifecycle::state::{AdState, AdStateView, ShowFailure};
use crate::logging::structured::LogContext;
use crate::network::monitor::{NetworkQualityMonitor, Suitability};
use crate::trigger::decision::{evaluate_admission, AdmissionDecision, DenyReason};
use crate::trigger::events::{AppState, Trigger, TriggerKind};

/// The gates a coordinator composes. Built once at startup and shared.
#[derive(Clone)]
pub struct Gates {
    pub consent: Arc<ConsentGate>,
    pub frequency: Arc<FrequencyPolicy>,
    pub network: NetworkQualityMonitor,
    pub interstitial: Arc<AdLifecycleController>,
}

/// Why a trigger did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    BelowThreshold { count: u32, required: u32 },
    Cooldown { remaining: Duration },
    SessionCap,
    ShortBackground,
    NotResume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Held(HoldReason),
    Denied(Trigger, DenyReason),
    ShowFailed(Trigger, ShowFailure),
    Shown(Trigger),
}

impl TriggerOutcome {
    pub fn was_shown(&self) -> bool {
        matches!(self, TriggerOutcome::Shown(_))
    }

    pub fn fired(&self) -> bool {
        !matches!(self, TriggerOutcome::Held(_))
    }
}

#[derive(Debug, Default)]
struct Windows {
    navigation_count: u32,
    navigation_last_fired: Option<DateTime<Utc>>,
    resume_last_fired: Option<DateTime<Utc>>,
    resume_ads_this_session: u32,
    app_state: AppState,
    background_since: Option<DateTime<Utc>>,
}

/// Serializable snapshot of every gate, for diagnostics screens and logs.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorDiagnostics {
    pub consent_status: ConsentStatus,
    pub can_request_ads: bool,
    pub ad_state: AdStateView,
    pub frequency: FrequencyData,
    pub time_until_next_ms: u64,
    pub network: Suitability,
    pub navigation_count: u32,
    pub resume_ads_this_session: u32,
    pub decision: AdmissionDecision,
}

pub struct TriggerCoordinator {
    config: TriggerConfig,
    test_mode: bool,
    gates: Gates,
    clock: Arc<dyn Clock>,
    windows: Mutex<Windows>,
    /// Surfaces kept filled alongside the interstitial but never shown here.
    companions: Vec<Arc<AdLifecycleController>>,
    ctx: LogContext,
}

impl TriggerCoordinator {
    pub fn new(
        config: TriggerConfig,
        test_mode: bool,
        gates: Gates,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = LogContext::new("trigger").with_surface(gates.interstitial.surface().as_str());
        Self {
            config,
            test_mode,
            gates,
            clock,
            windows: Mutex::new(Windows::default()),
            companions: Vec::new(),
            ctx,
        }
    }

    /// Also preload and retry these surfaces on start, resume and refill.
    pub fn with_companion_surfaces(mut self, surfaces: Vec<Arc<AdLifecycleController>>) -> Self {
        self.companions = surfaces;
        self
    }

    pub fn gates(&self) -> &Gates {
        &self.gates
    }

    /// Issue the first preloads. Called once at launch.
    pub fn start(&self) {
        log::info!(
            "{} COORDINATOR_START test_mode={} companions={}",
            self.ctx,
            self.test_mode,
            self.companions.len()
        );
        self.refill_surfaces();
    }

    /// Preload every IDLE or FAILED surface. Nothing is requested while
    /// consent does not allow ad requests. Returns how many loads started.
    pub fn refill_surfaces(&self) -> usize {
        if !self.gates.consent.can_request_ads() {
            log::debug!("{} REFILL_SKIPPED reason=consent", self.ctx);
            return 0;
        }
        let mut started = 0;
        for controller in std::iter::once(&self.gates.interstitial).chain(self.companions.iter()) {
            if matches!(controller.state(), AdState::Idle | AdState::Failed(_)) {
                controller.preload_ad(self.test_mode);
                started += 1;
            }
        }
        started
    }

    pub fn can_show_now(&self) -> AdmissionDecision {
        evaluate_admission(
            &self.gates.consent,
            &self.gates.interstitial,
            &self.gates.frequency,
            &self.gates.network,
            self.config.network_gate,
            &self.ctx,
        )
    }

    pub fn on_user_interaction(&self) -> u32 {
        self.gates.frequency.record_user_interaction()
    }

    /// One user-initiated tab switch or screen change.
    pub fn on_navigation(&self, kind: TriggerKind) -> TriggerOutcome {
        let now = self.clock.now();
        let trigger = {
            let mut w = self.windows.lock();
            w.navigation_count = w.navigation_count.saturating_add(1);

            if w.navigation_count < self.config.min_navigations_before_ad {
                return TriggerOutcome::Held(HoldReason::BelowThreshold {
                    count: w.navigation_count,
                    required: self.config.min_navigations_before_ad,
                });
            }
            if let Some(remaining) = self.cooldown_remaining(w.navigation_last_fired, now) {
                log::debug!(
                    "{} TRIGGER_HELD kind={} reason=cooldown remaining_ms={}",
                    self.ctx,
                    kind.as_str(),
                    remaining.as_millis()
                );
                return TriggerOutcome::Held(HoldReason::Cooldown { remaining });
            }

            let trigger = Trigger {
                kind,
                timestamp: now,
                counter_since_last_ad: w.navigation_count,
            };
            w.navigation_count = 0;
            w.navigation_last_fired = Some(now);
            trigger
        };

        self.attempt_show(trigger)
    }

    /// Platform app-state transition.
    pub fn on_app_state_change(&self, next: AppState) -> TriggerOutcome {
        let now = self.clock.now();
        let background_for = {
            let mut w = self.windows.lock();
            let previous = w.app_state;
            w.app_state = next;
            log::debug!(
                "{} APP_STATE_CHANGE from={} to={}",
                self.ctx,
                previous.as_str(),
                next.as_str()
            );

            match next {
                AppState::Background | AppState::Inactive => {
                    if w.background_since.is_none() {
                        w.background_since = Some(now);
                    }
                    return TriggerOutcome::Held(HoldReason::NotResume);
                }
                AppState::Active => match w.background_since.take() {
                    Some(since) => elapsed_between(since, now),
                    None => return TriggerOutcome::Held(HoldReason::NotResume),
                },
            }
        };

        log::info!(
            "{} APP_RESUMED background_ms={}",
            self.ctx,
            background_for.as_millis()
        );

        if background_for > self.config.new_session_threshold() {
            self.gates.frequency.reset_session();
            let mut w = self.windows.lock();
            w.resume_ads_this_session = 0;
            w.navigation_count = 0;
        }

        self.gates.consent.spawn_refresh_if_stale();

        // Retry is caller-driven: a resume is the natural moment to refill.
        self.refill_surfaces();

        self.fire_resume_trigger(background_for, now)
    }

    /// Conversation session boundary reported by the voice pipeline.
    pub fn on_session_end(&self) -> TriggerOutcome {
        let trigger = Trigger {
            kind: TriggerKind::SessionEnd,
            timestamp: self.clock.now(),
            counter_since_last_ad: self.windows.lock().navigation_count,
        };
        self.attempt_show(trigger)
    }

    pub fn diagnostics(&self) -> CoordinatorDiagnostics {
        let (navigation_count, resume_ads_this_session) = {
            let w = self.windows.lock();
            (w.navigation_count, w.resume_ads_this_session)
        };
        CoordinatorDiagnostics {
            consent_status: self.gates.consent.status(),
            can_request_ads: self.gates.consent.can_request_ads(),
            ad_state: self.gates.interstitial.get_state(),
            frequency: self.gates.frequency.data(),
            time_until_next_ms: self
                .gates
                .frequency
                .time_until_next_interstitial()
                .as_millis() as u64,
            network: self.gates.network.is_network_suitable_for_ads(),
            navigation_count,
            resume_ads_this_session,
            decision: self.can_show_now(),
        }
    }

    /// Clear trigger windows and frequency counters. Diagnostics only.
    pub fn reset_all(&self) {
        {
            let mut w = self.windows.lock();
            let app_state = w.app_state;
            let background_since = w.background_since;
            *w = Windows {
                app_state,
                background_since,
                ..Windows::default()
            };
        }
        self.gates.frequency.reset_all_data();
        log::info!("{} COORDINATOR_RESET", self.ctx);
    }

    fn fire_resume_trigger(&self, background_for: Duration, now: DateTime<Utc>) -> TriggerOutcome {
        let trigger = {
            let mut w = self.windows.lock();
            if background_for < self.config.min_background_time() {
                return TriggerOutcome::Held(HoldReason::ShortBackground);
            }
            if w.resume_ads_this_session >= self.config.max_ads_per_session {
                log::debug!(
                    "{} TRIGGER_HELD kind=APP_RESUME reason=session_cap shown={}",
                    self.ctx,
                    w.resume_ads_this_session
                );
                return TriggerOutcome::Held(HoldReason::SessionCap);
            }
            if let Some(remaining) = self.cooldown_remaining(w.resume_last_fired, now) {
                return TriggerOutcome::Held(HoldReason::Cooldown { remaining });
            }
            w.resume_last_fired = Some(now);
            Trigger {
                kind: TriggerKind::AppResume,
                timestamp: now,
                counter_since_last_ad: w.resume_ads_this_session,
            }
        };

        let outcome = self.attempt_show(trigger);
        if outcome.was_shown() {
            let mut w = self.windows.lock();
            w.resume_ads_this_session = w.resume_ads_this_session.saturating_add(1);
        }
        outcome
    }

    fn attempt_show(&self, trigger: Trigger) -> TriggerOutcome {
        log::info!(
            "{} TRIGGER_FIRED kind={} counter={}",
            self.ctx,
            trigger.kind.as_str(),
            trigger.counter_since_last_ad
        );

        if let AdmissionDecision::Deny(reason) = self.can_show_now() {
            return TriggerOutcome::Denied(trigger, reason);
        }

        let outcome = self.gates.interstitial.show_ad();
        if outcome.success {
            self.gates.frequency.record_interstitial_shown();
            log::info!("{} AD_SHOWN kind={}", self.ctx, trigger.kind.as_str());
            TriggerOutcome::Shown(trigger)
        } else {
            let failure = outcome.reason.unwrap_or(ShowFailure::NotReady);
            log::warn!(
                "{} AD_SHOW_UNSUCCESSFUL kind={} reason={}",
                self.ctx,
                trigger.kind.as_str(),
                failure
            );
            TriggerOutcome::ShowFailed(trigger, failure)
        }
    }

    fn cooldown_remaining(
        &self,
        last_fired: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = last_fired?;
        let remaining = self
            .config
            .cooldown_between_ads()
            .saturating_sub(elapsed_between(last, now));
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }
}
