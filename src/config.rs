//! Engine configuration.
//!
//! Loaded from JSON; every section and field falls back to its default so a
//! partial file is valid. Durations are expressed in milliseconds.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdGateConfig {
    pub frequency: FrequencyConfig,
    pub triggers: TriggerConfig,
    pub consent: ConsentSettings,
    pub network: NetworkConfig,
    pub lifecycle: LifecycleConfig,
}

impl AdGateConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AdGateConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        log::info!(
            "CONFIG_LOADED path={} max_per_session={} min_interval_ms={}",
            path.display(),
            config.frequency.max_per_session,
            config.frequency.min_interval_ms
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency.max_per_session == 0 {
            return Err(ConfigError::Invalid {
                field: "frequency.max_per_session",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.network.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "network.history_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.network.min_strength) {
            return Err(ConfigError::Invalid {
                field: "network.min_strength",
                reason: format!("{} is outside [0, 1]", self.network.min_strength),
            });
        }
        Ok(())
    }
}

/// Interstitial budgets enforced by the frequency policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    pub min_interactions_before_first: u32,
    pub max_per_session: u32,
    pub min_interval_ms: u64,
}

impl FrequencyConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            min_interactions_before_first: 1,
            max_per_session: 5,
            min_interval_ms: 45_000,
        }
    }
}

/// How the coordinator treats an unsuitable network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkGateMode {
    /// Deny the show.
    #[default]
    Enforce,
    /// Log the degraded network and show the already-loaded ad anyway.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub min_navigations_before_ad: u32,
    pub cooldown_between_ads_ms: u64,
    pub min_background_time_ms: u64,
    pub max_ads_per_session: u32,
    /// Background duration after which a resume starts a new session.
    pub new_session_threshold_ms: u64,
    pub network_gate: NetworkGateMode,
}

impl TriggerConfig {
    pub fn cooldown_between_ads(&self) -> Duration {
        Duration::from_millis(self.cooldown_between_ads_ms)
    }

    pub fn min_background_time(&self) -> Duration {
        Duration::from_millis(self.min_background_time_ms)
    }

    pub fn new_session_threshold(&self) -> Duration {
        Duration::from_millis(self.new_session_threshold_ms)
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            min_navigations_before_ad: 3,
            cooldown_between_ads_ms: 60_000,
            min_background_time_ms: 30_000,
            max_ads_per_session: 3,
            new_session_threshold_ms: 30 * 60 * 1000,
            network_gate: NetworkGateMode::Enforce,
        }
    }
}

/// Debug geography forwarded to the consent SDK.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugGeography {
    #[default]
    Disabled,
    Eea,
    NotEea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentSettings {
    pub cache_ttl_ms: u64,
    pub debug_geography: DebugGeography,
    pub test_device_ids: Vec<String>,
    pub tag_for_under_age: bool,
}

impl ConsentSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 60 * 60 * 1000,
            debug_geography: DebugGeography::Disabled,
            test_device_ids: Vec::new(),
            tag_for_under_age: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub history_capacity: usize,
    pub min_strength: f64,
    pub flapping_window_ms: u64,
    pub max_disconnects_in_window: usize,
}

impl NetworkConfig {
    pub fn flapping_window(&self) -> Duration {
        Duration::from_millis(self.flapping_window_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            min_strength: 0.3,
            flapping_window_ms: 60_000,
            max_disconnects_in_window: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub test_mode: bool,
    pub state_refresh_interval_ms: u64,
    pub consent_refresh_interval_ms: u64,
}

impl LifecycleConfig {
    pub fn state_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.state_refresh_interval_ms)
    }

    pub fn consent_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.consent_refresh_interval_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            state_refresh_interval_ms: 1000,
            consent_refresh_interval_ms: 5 * 60 * 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AdGateConfig::from_json(r#"{"frequency": {"max_per_session": 2}}"#).unwrap();
        assert_eq!(config.frequency.max_per_session, 2);
        assert_eq!(config.frequency.min_interval(), Duration::from_millis(45_000));
        assert_eq!(config.network.history_capacity, 20);
        assert_eq!(config.triggers.network_gate, NetworkGateMode::Enforce);
    }

    #[test]
    fn test_network_gate_mode_parses() {
        let config =
            AdGateConfig::from_json(r#"{"triggers": {"network_gate": "advisory"}}"#).unwrap();
        assert_eq!(config.triggers.network_gate, NetworkGateMode::Advisory);
    }

    #[test]
    fn test_rejects_zero_session_cap() {
        let err = AdGateConfig::from_json(r#"{"frequency": {"max_per_session": 0}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "frequency.max_per_session",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_out_of_range_strength() {
        let err = AdGateConfig::from_json(r#"{"network": {"min_strength": 1.5}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = AdGateConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_file_missing_path_has_context() {
        let err = AdGateConfig::load_file(Path::new("/nonexistent/adgate.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("reading config file"));
    }
}
