//! Ad surface state model and SDK event types.

use std::fmt;

use serde::Serialize;

use crate::error::{AdLoadError, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdSurface {
    Interstitial,
    Rewarded,
    AppOpen,
}

impl AdSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdSurface::Interstitial => "interstitial",
            AdSurface::Rewarded => "rewarded",
            AdSurface::AppOpen => "app_open",
        }
    }
}

impl fmt::Display for AdSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Showing,
    Failed(AdLoadError),
}

impl AdState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdState::Idle => "IDLE",
            AdState::Loading => "LOADING",
            AdState::Loaded => "LOADED",
            AdState::Showing => "SHOWING",
            AdState::Failed(_) => "FAILED",
        }
    }

    pub fn error(&self) -> Option<&AdLoadError> {
        match self {
            AdState::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Boolean projection of `AdState` for UI consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdStateView {
    pub is_loaded: bool,
    pub is_loading: bool,
    pub is_showing: bool,
    pub error: Option<String>,
}

impl From<&AdState> for AdStateView {
    fn from(state: &AdState) -> Self {
        Self {
            is_loaded: matches!(state, AdState::Loaded),
            is_loading: matches!(state, AdState::Loading),
            is_showing: matches!(state, AdState::Showing),
            error: state.error().map(|e| e.message.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub amount: u32,
    pub kind: String,
}

/// SDK callback, tagged with the generation of the load it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdEvent {
    pub generation: u64,
    pub kind: AdEventKind,
}

impl AdEvent {
    pub fn new(generation: u64, kind: AdEventKind) -> Self {
        Self { generation, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdEventKind {
    Loaded,
    FailedToLoad(AdLoadError),
    Opened,
    Clicked,
    UserEarnedReward(Reward),
    FailedToShow(ProviderError),
    Closed,
}

impl AdEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdEventKind::Loaded => "loaded",
            AdEventKind::FailedToLoad(_) => "failed_to_load",
            AdEventKind::Opened => "opened",
            AdEventKind::Clicked => "clicked",
            AdEventKind::UserEarnedReward(_) => "user_earned_reward",
            AdEventKind::FailedToShow(_) => "failed_to_show",
            AdEventKind::Closed => "closed",
        }
    }
}

/// Parameters handed to the SDK for one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub surface: AdSurface,
    pub test_mode: bool,
    /// Echo this back on every `AdEvent` for the load.
    pub generation: u64,
    pub request_id: String,
}

/// Why `show_ad` did not show anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowFailure {
    NotReady,
    Sdk(ProviderError),
}

impl fmt::Display for ShowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShowFailure::NotReady => f.write_str("ad not ready"),
            ShowFailure::Sdk(e) => write!(f, "show failed: {}", e.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowOutcome {
    pub success: bool,
    pub reason: Option<ShowFailure>,
}

impl ShowOutcome {
    pub fn shown() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: ShowFailure) -> Self {
        Self {
            success: false,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_projection() {
        let view = AdStateView::from(&AdState::Failed(AdLoadError::new(3, "no fill")));
        assert!(!view.is_loaded && !view.is_loading && !view.is_showing);
        assert_eq!(view.error.as_deref(), Some("no fill"));

        let view = AdStateView::from(&AdState::Loaded);
        assert!(view.is_loaded);
        assert!(view.error.is_none());
    }

    #[test]
    fn test_show_failure_messages() {
        assert_eq!(ShowFailure::NotReady.to_string(), "ad not ready");
        assert_eq!(
            ShowFailure::Sdk(ProviderError::new(1, "activity gone")).to_string(),
            "show failed: activity gone"
        );
    }
}
