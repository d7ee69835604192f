//! Persisted frequency counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters persisted across restarts.
///
/// `session_count` never exceeds `total_shown`. Counters only go back to
/// zero through `FrequencyPolicy::reset_session` / `reset_all_data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyData {
    /// `None` until the first interstitial is shown.
    pub last_shown: Option<DateTime<Utc>>,
    pub session_count: u32,
    pub total_shown: u32,
    pub user_interactions: u32,
    pub session_start_time: DateTime<Utc>,
}

impl FrequencyData {
    pub fn new_session(now: DateTime<Utc>) -> Self {
        Self {
            session_start_time: now,
            ..Self::default()
        }
    }

    /// Repair a snapshot that violates the counter invariant.
    ///
    /// Returns true when something was changed.
    pub fn repair(&mut self) -> bool {
        if self.session_count > self.total_shown {
            self.session_count = self.total_shown;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_clamps_session_count() {
        let mut data = FrequencyData {
            session_count: 4,
            total_shown: 2,
            ..FrequencyData::default()
        };
        assert!(data.repair());
        assert_eq!(data.session_count, 2);
        assert!(!data.repair());
    }

    #[test]
    fn test_never_shown_serializes_as_null() {
        let data = FrequencyData::default();
        let json = serde_json::to_value(&data).unwrap();
        assert!(json["last_shown"].is_null());
    }
}
