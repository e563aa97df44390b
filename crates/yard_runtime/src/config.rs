use std::time::Duration;

use serde::{Deserialize, Serialize};
use yard_core::Tuning;

/// Session-wide switches, subsystem cadence and balance constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The server peer. Only it broadcasts state and runs server-only subsystems.
    pub authoritative: bool,
    /// Pipeline faults are returned from `tick` instead of being skipped.
    pub diagnostic: bool,
    pub menu_interval_ms: u64,
    pub detection_interval_ms: u64,
    pub conveyor_interval_ms: u64,
    pub tuning: Tuning,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authoritative: true,
            diagnostic: false,
            menu_interval_ms: 200,
            detection_interval_ms: 500,
            conveyor_interval_ms: 5000,
            tuning: Tuning::default(),
        }
    }
}

impl SessionConfig {
    pub fn menu_interval(&self) -> Duration {
        Duration::from_millis(self.menu_interval_ms)
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn conveyor_interval(&self) -> Duration {
        Duration::from_millis(self.conveyor_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"diagnostic": true, "tuning": {"idle_power": 7.0}}"#)
                .unwrap();
        assert!(config.diagnostic);
        assert!(config.authoritative);
        assert_eq!(config.detection_interval(), Duration::from_millis(500));
        assert!((config.tuning.idle_power - 7.0).abs() < 1e-12);
        assert!((config.tuning.beam_base_power - 30.0).abs() < 1e-12);
    }
}
