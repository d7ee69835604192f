//! Consent data model and the consent SDK contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConsentSettings;
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    #[default]
    Unknown,
    Required,
    NotRequired,
    Obtained,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Unknown => "UNKNOWN",
            ConsentStatus::Required => "REQUIRED",
            ConsentStatus::NotRequired => "NOT_REQUIRED",
            ConsentStatus::Obtained => "OBTAINED",
        }
    }

    pub fn allows_ad_requests(&self) -> bool {
        matches!(self, ConsentStatus::Obtained | ConsentStatus::NotRequired)
    }
}

/// Cached consent state. `can_request_ads` is derived from `status` and
/// cannot be set on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentInfo {
    pub status: ConsentStatus,
    pub is_privacy_options_required: bool,
    pub last_updated: DateTime<Utc>,
    pub user_location: String,
}

impl ConsentInfo {
    pub fn new(update: ConsentUpdate, now: DateTime<Utc>) -> Self {
        Self {
            status: update.status,
            is_privacy_options_required: update.is_privacy_options_required,
            last_updated: now,
            user_location: update.user_location,
        }
    }

    /// Conservative answer used when nothing is known.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            status: ConsentStatus::Unknown,
            is_privacy_options_required: false,
            last_updated: now,
            user_location: "unknown".to_string(),
        }
    }

    pub fn can_request_ads(&self) -> bool {
        self.status.allows_ad_requests()
    }

    /// Copy with a new status reported by a consent form.
    pub fn with_status(&self, status: ConsentStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            last_updated: now,
            ..self.clone()
        }
    }
}

/// Result of a consent-info update from the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentUpdate {
    pub status: ConsentStatus,
    pub is_privacy_options_required: bool,
    pub user_location: String,
}

/// Result of presenting the consent form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormResult {
    pub shown: bool,
    /// Status after the form was dismissed.
    pub status: ConsentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivacyOptionsResult {
    pub success: bool,
    pub status: ConsentStatus,
}

/// Outcome returned to callers of `ConsentGate::show_consent_form`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormOutcome {
    pub shown: bool,
    pub can_request_ads: bool,
}

/// Consent SDK adapter.
pub trait ConsentProvider: Send + Sync {
    fn request_consent_info_update(
        &self,
        config: &ConsentSettings,
    ) -> Result<ConsentUpdate, ProviderError>;
    fn show_form(&self) -> Result<FormResult, ProviderError>;
    fn show_privacy_options_form(&self) -> Result<PrivacyOptionsResult, ProviderError>;
}
