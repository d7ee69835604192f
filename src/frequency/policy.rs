//! Interstitial frequency policy.
//!
//! Every mutation runs read-modify-write under a single lock and persists
//! before the lock is released, so interleaved trigger sources can't lose
//! updates or write snapshots out of order.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::{elapsed_between, Clock};
use crate::config::FrequencyConfig;
use crate::frequency::data::FrequencyData;
use crate::log_info;
use crate::logging::structured::LogContext;
use crate::storage::snapshots::FrequencyStore;

/// Why the policy refused an interstitial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyDenial {
    InsufficientInteractions,
    SessionCapReached,
    CooldownActive,
}

impl FrequencyDenial {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyDenial::InsufficientInteractions => "insufficient interactions",
            FrequencyDenial::SessionCapReached => "session cap reached",
            FrequencyDenial::CooldownActive => "cooldown active",
        }
    }
}

impl fmt::Display for FrequencyDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyDecision {
    pub can_show: bool,
    pub reason: Option<FrequencyDenial>,
    /// Only set for `CooldownActive`.
    pub wait_time: Option<Duration>,
}

impl FrequencyDecision {
    pub fn allowed() -> Self {
        Self {
            can_show: true,
            reason: None,
            wait_time: None,
        }
    }

    pub fn denied(reason: FrequencyDenial, wait_time: Option<Duration>) -> Self {
        Self {
            can_show: false,
            reason: Some(reason),
            wait_time,
        }
    }
}

pub struct FrequencyPolicy {
    config: FrequencyConfig,
    data: Mutex<FrequencyData>,
    store: Arc<dyn FrequencyStore>,
    clock: Arc<dyn Clock>,
    ctx: LogContext,
}

impl FrequencyPolicy {
    /// Build the policy, rehydrating counters from `store`.
    ///
    /// A failed or corrupt read starts from fresh counters.
    pub fn new(
        config: FrequencyConfig,
        store: Arc<dyn FrequencyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = LogContext::new("frequency");
        let now = clock.now();

        let data = match store.load() {
            Ok(Some(mut data)) => {
                if data.repair() {
                    log::warn!(
                        "{} FREQUENCY_DATA_REPAIRED session_count={} total_shown={}",
                        ctx,
                        data.session_count,
                        data.total_shown
                    );
                }
                log::info!(
                    "{} FREQUENCY_DATA_RESTORED session_count={} total_shown={} interactions={}",
                    ctx,
                    data.session_count,
                    data.total_shown,
                    data.user_interactions
                );
                data
            }
            Ok(None) => FrequencyData::new_session(now),
            Err(e) => {
                log::warn!("{} STORAGE_READ_FAILED error={}", ctx, e);
                FrequencyData::new_session(now)
            }
        };

        Self {
            config,
            data: Mutex::new(data),
            store,
            clock,
            ctx,
        }
    }

    pub fn config(&self) -> &FrequencyConfig {
        &self.config
    }

    /// Snapshot of the current counters.
    pub fn data(&self) -> FrequencyData {
        self.data.lock().clone()
    }

    /// Returns the new interaction count.
    pub fn record_user_interaction(&self) -> u32 {
        self.mutate(|data, _| {
            data.user_interactions = data.user_interactions.saturating_add(1);
            data.user_interactions
        })
    }

    pub fn record_interstitial_shown(&self) {
        let (session_count, total_shown) = self.mutate(|data, now| {
            data.last_shown = Some(now);
            data.session_count = data.session_count.saturating_add(1);
            data.total_shown = data.total_shown.saturating_add(1);
            (data.session_count, data.total_shown)
        });
        log_info!(
            self.ctx,
            "INTERSTITIAL_RECORDED",
            session_count = session_count,
            total_shown = total_shown
        );
    }

    /// Checks run in a fixed order; the first failing one is reported.
    pub fn can_show_interstitial(&self) -> FrequencyDecision {
        let now = self.clock.now();
        let data = self.data.lock();

        if data.user_interactions < self.config.min_interactions_before_first {
            log::debug!(
                "{} FREQUENCY_DENIED reason=insufficient_interactions interactions={} required={}",
                self.ctx,
                data.user_interactions,
                self.config.min_interactions_before_first
            );
            return FrequencyDecision::denied(FrequencyDenial::InsufficientInteractions, None);
        }

        if data.session_count >= self.config.max_per_session {
            log::debug!(
                "{} FREQUENCY_DENIED reason=session_cap session_count={} max={}",
                self.ctx,
                data.session_count,
                self.config.max_per_session
            );
            return FrequencyDecision::denied(FrequencyDenial::SessionCapReached, None);
        }

        if let Some(last_shown) = data.last_shown {
            let elapsed = elapsed_between(last_shown, now);
            let min_interval = self.config.min_interval();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                log::debug!(
                    "{} FREQUENCY_DENIED reason=cooldown wait_ms={}",
                    self.ctx,
                    wait.as_millis()
                );
                return FrequencyDecision::denied(FrequencyDenial::CooldownActive, Some(wait));
            }
        }

        FrequencyDecision::allowed()
    }

    /// Zero when never shown or when the cooldown has elapsed.
    pub fn time_until_next_interstitial(&self) -> Duration {
        let now = self.clock.now();
        match self.data.lock().last_shown {
            Some(last_shown) => self
                .config
                .min_interval()
                .saturating_sub(elapsed_between(last_shown, now)),
            None => Duration::ZERO,
        }
    }

    /// Start a new session: zero the session counter, keep lifetime totals.
    pub fn reset_session(&self) {
        self.mutate(|data, now| {
            data.session_count = 0;
            data.session_start_time = now;
        });
        log_info!(self.ctx, "SESSION_RESET");
    }

    /// Zero every counter. Diagnostics only.
    pub fn reset_all_data(&self) {
        self.mutate(|data, now| {
            *data = FrequencyData::new_session(now);
        });
        log_info!(self.ctx, "FREQUENCY_DATA_RESET");
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut FrequencyData, chrono::DateTime<chrono::Utc>) -> R,
    ) -> R {
        let now = self.clock.now();
        let mut data = self.data.lock();
        let result = f(&mut data, now);
        if let Err(e) = self.store.save(&data) {
            log::warn!("{} STORAGE_WRITE_FAILED error={}", self.ctx, e);
        }
        result
    }
}
