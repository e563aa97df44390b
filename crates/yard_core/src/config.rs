use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Balance constants for power, reach, movement assistance and stats.
///
/// The power and stats values are empirically tuned; keep them as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Draw of a tool with no active beam.
    pub idle_power: f64,
    /// Flat draw of one active beam before reach cost.
    pub beam_base_power: f64,
    pub reach_exponent: f64,
    pub reach_factor: f64,
    /// Mobile yards pay this factor for stability.
    pub mobile_power_factor: f64,
    /// Largest velocity change a nudge may apply per pass (m/s).
    pub nudge_clamp: f64,
    /// Power per unit of impulse spent by advanced locking.
    pub locking_power_per_impulse: f64,
    /// Beams never reach farther than this from their tool.
    pub max_beam_reach_m: f64,
    /// Padding around tool positions when a mobile yard rebuilds its volume.
    pub box_padding_m: f64,
    pub max_tools: usize,
    pub catalog_refresh_ms: u64,
    /// A finished stats scan is withheld until this long after it started.
    pub stats_min_display_ms: u64,
    /// Component estimates are divided by `max(half_extent² / this, 1)`.
    pub stats_component_normalizer: f64,
    /// Floor for a single block's time estimate.
    pub stats_min_block_secs: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            idle_power: 5.0,
            beam_base_power: 30.0,
            reach_exponent: 0.7,
            reach_factor: 2.0,
            mobile_power_factor: 2.0,
            nudge_clamp: 0.01,
            locking_power_per_impulse: 1e-4,
            max_beam_reach_m: 250.0,
            box_padding_m: 2.5,
            max_tools: 8,
            catalog_refresh_ms: 500,
            stats_min_display_ms: 6000,
            stats_component_normalizer: 200_000.0,
            stats_min_block_secs: 0.5,
        }
    }
}

impl Tuning {
    pub fn catalog_refresh(&self) -> Duration {
        Duration::from_millis(self.catalog_refresh_ms)
    }

    pub fn stats_min_display(&self) -> Duration {
        Duration::from_millis(self.stats_min_display_ms)
    }
}
