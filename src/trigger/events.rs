//! Trigger and app-state event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    TabSwitch,
    ScreenNav,
    AppResume,
    SessionEnd,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::TabSwitch => "TAB_SWITCH",
            TriggerKind::ScreenNav => "SCREEN_NAV",
            TriggerKind::AppResume => "APP_RESUME",
            TriggerKind::SessionEnd => "SESSION_END",
        }
    }
}

/// A trigger that fired and asked for an admission decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub timestamp: DateTime<Utc>,
    pub counter_since_last_ad: u32,
}

/// Platform app-lifecycle signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Active,
    Background,
    Inactive,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Active => "active",
            AppState::Background => "background",
            AppState::Inactive => "inactive",
        }
    }
}
