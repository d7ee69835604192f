//! Connectivity data model.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_between;

/// Strength assumed for a connected link that reports no signal quality.
pub const DEFAULT_CONNECTED_STRENGTH: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    None,
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Vpn,
    Other,
    #[default]
    Unknown,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::None => "none",
            ConnectionType::Wifi => "wifi",
            ConnectionType::Cellular => "cellular",
            ConnectionType::Ethernet => "ethernet",
            ConnectionType::Bluetooth => "bluetooth",
            ConnectionType::Vpn => "vpn",
            ConnectionType::Other => "other",
            ConnectionType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellularGeneration {
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "3g")]
    G3,
    #[serde(rename = "4g")]
    G4,
    #[serde(rename = "5g")]
    G5,
    Unknown,
}

impl CellularGeneration {
    pub fn strength(&self) -> f64 {
        match self {
            CellularGeneration::G5 => 0.9,
            CellularGeneration::G4 => 0.8,
            CellularGeneration::G3 => 0.6,
            CellularGeneration::G2 => 0.4,
            CellularGeneration::Unknown => 0.5,
        }
    }
}

/// Link details reported alongside a connectivity change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    /// Wi-Fi signal, 0-100.
    pub wifi_strength: Option<u8>,
    pub cellular_generation: Option<CellularGeneration>,
}

/// One report from the platform connectivity signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivitySnapshot {
    pub is_connected: bool,
    /// `None` while the platform has not checked reachability yet.
    pub is_internet_reachable: Option<bool>,
    pub connection_type: ConnectionType,
    pub details: ConnectionDetails,
}

impl ConnectivitySnapshot {
    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
            connection_type: ConnectionType::None,
            details: ConnectionDetails::default(),
        }
    }

    pub fn wifi(strength_percent: u8) -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
            connection_type: ConnectionType::Wifi,
            details: ConnectionDetails {
                wifi_strength: Some(strength_percent),
                cellular_generation: None,
            },
        }
    }

    pub fn cellular(generation: CellularGeneration) -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
            connection_type: ConnectionType::Cellular,
            details: ConnectionDetails {
                wifi_strength: None,
                cellular_generation: Some(generation),
            },
        }
    }

    /// Unknown reachability follows the link state.
    pub fn internet_reachable(&self) -> bool {
        self.is_internet_reachable.unwrap_or(self.is_connected)
    }

    /// Signal strength in [0, 1].
    pub fn strength(&self) -> f64 {
        if !self.is_connected {
            return 0.0;
        }
        match self.connection_type {
            ConnectionType::Wifi => self
                .details
                .wifi_strength
                .map(|pct| f64::from(pct.min(100)) / 100.0)
                .unwrap_or(DEFAULT_CONNECTED_STRENGTH),
            ConnectionType::Cellular => self
                .details
                .cellular_generation
                .unwrap_or(CellularGeneration::Unknown)
                .strength(),
            _ => DEFAULT_CONNECTED_STRENGTH,
        }
    }
}

/// A recorded transition. Never modified after it is pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub timestamp: DateTime<Utc>,
    pub is_connected: bool,
    pub connection_type: ConnectionType,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub is_connected: bool,
    pub is_internet_reachable: bool,
    pub connection_type: ConnectionType,
    pub strength: f64,
    pub last_connected_time: Option<DateTime<Utc>>,
    /// Newest first.
    pub connection_history: VecDeque<ConnectionEvent>,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: false,
            connection_type: ConnectionType::Unknown,
            strength: 0.0,
            last_connected_time: None,
            connection_history: VecDeque::new(),
        }
    }
}

impl NetworkState {
    /// Fold a platform report into the state and record the transition.
    pub fn apply(
        &mut self,
        snapshot: &ConnectivitySnapshot,
        now: DateTime<Utc>,
        reason: Option<&str>,
        capacity: usize,
    ) {
        self.is_connected = snapshot.is_connected;
        self.is_internet_reachable = snapshot.is_connected && snapshot.internet_reachable();
        self.connection_type = snapshot.connection_type;
        self.strength = snapshot.strength();

        if snapshot.is_connected {
            self.last_connected_time = Some(match self.last_connected_time {
                Some(prev) if prev > now => prev,
                _ => now,
            });
        }

        self.push_event(
            ConnectionEvent {
                timestamp: now,
                is_connected: snapshot.is_connected,
                connection_type: snapshot.connection_type,
                reason: reason.map(|r| r.to_string()),
            },
            capacity,
        );
    }

    pub fn push_event(&mut self, event: ConnectionEvent, capacity: usize) {
        self.connection_history.push_front(event);
        self.connection_history.truncate(capacity);
    }

    /// Disconnect events no older than `window` before `now`.
    pub fn disconnects_within(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.connection_history
            .iter()
            .filter(|e| {
                !e.is_connected && e.timestamp <= now && elapsed_between(e.timestamp, now) <= window
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_wifi_strength_from_percentage() {
        assert_eq!(ConnectivitySnapshot::wifi(65).strength(), 0.65);

        let mut no_signal = ConnectivitySnapshot::wifi(0);
        no_signal.details.wifi_strength = None;
        assert_eq!(no_signal.strength(), DEFAULT_CONNECTED_STRENGTH);
    }

    #[test]
    fn test_cellular_strength_table() {
        assert_eq!(ConnectivitySnapshot::cellular(CellularGeneration::G5).strength(), 0.9);
        assert_eq!(ConnectivitySnapshot::cellular(CellularGeneration::G4).strength(), 0.8);
        assert_eq!(ConnectivitySnapshot::cellular(CellularGeneration::G3).strength(), 0.6);
        assert_eq!(ConnectivitySnapshot::cellular(CellularGeneration::G2).strength(), 0.4);
        assert_eq!(ConnectivitySnapshot::cellular(CellularGeneration::Unknown).strength(), 0.5);
    }

    #[test]
    fn test_disconnected_has_zero_strength() {
        assert_eq!(ConnectivitySnapshot::disconnected().strength(), 0.0);
    }

    #[test]
    fn test_ethernet_uses_default_strength() {
        let snapshot = ConnectivitySnapshot {
            is_connected: true,
            is_internet_reachable: None,
            connection_type: ConnectionType::Ethernet,
            details: ConnectionDetails::default(),
        };
        assert_eq!(snapshot.strength(), DEFAULT_CONNECTED_STRENGTH);
        assert!(snapshot.internet_reachable());
    }

    #[test]
    fn test_last_connected_time_not_moved_backwards() {
        let mut state = NetworkState::default();
        let later = t0() + chrono::Duration::seconds(10);
        state.apply(&ConnectivitySnapshot::wifi(80), later, None, 20);
        state.apply(&ConnectivitySnapshot::wifi(80), t0(), None, 20);
        assert_eq!(state.last_connected_time, Some(later));
    }

    #[test]
    fn test_history_is_newest_first() {
        let mut state = NetworkState::default();
        state.apply(&ConnectivitySnapshot::wifi(80), t0(), Some("initial"), 20);
        state.apply(
            &ConnectivitySnapshot::disconnected(),
            t0() + chrono::Duration::seconds(1),
            None,
            20,
        );
        assert!(!state.connection_history[0].is_connected);
        assert_eq!(state.connection_history[1].reason.as_deref(), Some("initial"));
    }

    #[test]
    fn test_disconnects_outside_window_ignored() {
        let mut state = NetworkState::default();
        let now = t0() + chrono::Duration::seconds(120);
        state.apply(&ConnectivitySnapshot::disconnected(), t0(), None, 20);
        state.apply(&ConnectivitySnapshot::disconnected(), now, None, 20);
        assert_eq!(state.disconnects_within(now, Duration::from_secs(60)), 1);
    }

    proptest! {
        #[test]
        fn prop_history_bounded(
            connected in proptest::collection::vec(any::<bool>(), 0..100),
            capacity in 1usize..30,
        ) {
            let mut state = NetworkState::default();
            for (i, up) in connected.iter().enumerate() {
                let snapshot = if *up {
                    ConnectivitySnapshot::wifi(90)
                } else {
                    ConnectivitySnapshot::disconnected()
                };
                state.apply(&snapshot, t0() + chrono::Duration::seconds(i as i64), None, capacity);
                prop_assert!(state.connection_history.len() <= capacity);
            }
            if let Some(newest) = state.connection_history.front() {
                prop_assert_eq!(newest.is_connected, *connected.last().unwrap());
            }
        }
    }
}
