//! Admission decision logic.
//!
//! Decides whether an interstitial may be shown right now.

use std::fmt;

use serde::Serialize;

use crate::config::NetworkGateMode;
use crate::consent::gate::ConsentGate;
use crate::frequency::policy::{FrequencyDenial, FrequencyPolicy};
use crate::lifecycle::controller::AdLifecycleController;
use crate::logging::structured::LogContext;
use crate::network::monitor::{NetworkQualityMonitor, SuitabilityReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Consent,
    NotLoaded,
    Frequency(FrequencyDenial),
    Network(SuitabilityReason),
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Consent => "consent",
            DenyReason::NotLoaded => "not loaded",
            DenyReason::Frequency(f) => f.as_str(),
            DenyReason::Network(n) => n.as_str(),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DenyReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AdmissionDecision {
    Allow,
    Deny(DenyReason),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allow)
    }

    pub fn as_str(&self) -> &str {
        match self {
            AdmissionDecision::Allow => "allow",
            AdmissionDecision::Deny(reason) => reason.as_str(),
        }
    }
}

/// Evaluate the gates in fixed order; the first denial wins.
///
/// # Decision Tree
/// 1. Consent does not allow ad requests -> Deny(consent)
/// 2. Surface is not LOADED -> Deny(not loaded)
/// 3. Frequency policy refuses -> Deny(frequency reason)
/// 4. Network unsuitable -> Deny(network reason), or only logged in advisory mode
/// 5. Otherwise -> Allow
pub fn evaluate_admission(
    consent: &ConsentGate,
    lifecycle: &AdLifecycleController,
    frequency: &FrequencyPolicy,
    network: &NetworkQualityMonitor,
    network_gate: NetworkGateMode,
    ctx: &LogContext,
) -> AdmissionDecision {
    if !consent.can_request_ads() {
        log::info!(
            "{} ADMISSION_DENIED reason=consent status={}",
            ctx,
            consent.status().as_str()
        );
        return AdmissionDecision::Deny(DenyReason::Consent);
    }

    if !lifecycle.is_loaded() {
        log::info!(
            "{} ADMISSION_DENIED reason=not_loaded state={}",
            ctx,
            lifecycle.state().as_str()
        );
        return AdmissionDecision::Deny(DenyReason::NotLoaded);
    }

    let freq = frequency.can_show_interstitial();
    if let Some(reason) = freq.reason.filter(|_| !freq.can_show) {
        log::info!(
            "{} ADMISSION_DENIED reason=frequency detail={:?} wait_ms={:?}",
            ctx,
            reason.as_str(),
            freq.wait_time.map(|w| w.as_millis())
        );
        return AdmissionDecision::Deny(DenyReason::Frequency(reason));
    }

    let net = network.is_network_suitable_for_ads();
    if !net.suitable {
        match network_gate {
            NetworkGateMode::Enforce => {
                log::info!(
                    "{} ADMISSION_DENIED reason=network detail={:?} confidence={:.2}",
                    ctx,
                    net.reason.as_str(),
                    net.confidence
                );
                return AdmissionDecision::Deny(DenyReason::Network(net.reason));
            }
            NetworkGateMode::Advisory => {
                log::warn!(
                    "{} ADMISSION_NETWORK_DEGRADED detail={:?} confidence={:.2}",
                    ctx,
                    net.reason.as_str(),
                    net.confidence
                );
            }
        }
    }

    log::info!("{} ADMISSION_ALLOWED", ctx);
    AdmissionDecision::Allow
}
