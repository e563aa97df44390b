//! Tool power model.

use crate::config::Tuning;
use crate::YardState;

/// Inputs for one tool's draw on one pass.
#[derive(Debug, Clone, Copy)]
pub struct ToolDraw<'a> {
    pub state: YardState,
    /// Powered tools only; anything else draws nothing.
    pub powered: bool,
    pub mobile: bool,
    /// Distance of each active beam's target from this tool.
    pub beam_distances: &'a [f64],
    /// Weld or grind multiplier, depending on the state.
    pub multiplier: f64,
    /// This tool's part of the advanced-locking cost.
    pub locking_share: f64,
}

/// Draw of a single active beam at `distance` metres.
pub fn beam_power(distance: f64, multiplier: f64, tuning: &Tuning) -> f64 {
    (tuning.beam_base_power + distance.powf(tuning.reach_exponent) * tuning.reach_factor)
        * multiplier
}

pub fn tool_power(draw: &ToolDraw<'_>, tuning: &Tuning) -> f64 {
    if !draw.powered {
        return 0.0;
    }
    if !draw.state.is_building() {
        return tuning.idle_power + draw.locking_share;
    }
    let beams: f64 = draw
        .beam_distances
        .iter()
        .map(|d| beam_power(*d, draw.multiplier, tuning))
        .sum();
    let factor = if draw.mobile {
        tuning.mobile_power_factor
    } else {
        1.0
    };
    (tuning.idle_power + beams) * factor + draw.locking_share
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(state: YardState, distances: &[f64]) -> ToolDraw<'_> {
        ToolDraw {
            state,
            powered: true,
            mobile: false,
            beam_distances: distances,
            multiplier: 1.0,
            locking_share: 0.0,
        }
    }

    #[test]
    fn beam_power_at_zero_distance_is_base() {
        let tuning = Tuning::default();
        assert!((beam_power(0.0, 1.0, &tuning) - 30.0).abs() < 1e-12);
        assert!((beam_power(0.0, 0.1, &tuning) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn idle_states_ignore_beams() {
        let tuning = Tuning::default();
        let power = tool_power(&draw(YardState::Disabled, &[10.0]), &tuning);
        assert!((power - 5.0).abs() < 1e-12);
        let invalid = tool_power(&draw(YardState::Invalid, &[]), &tuning);
        assert!((invalid - 5.0).abs() < 1e-12);
    }

    #[test]
    fn unpowered_tool_draws_nothing() {
        let tuning = Tuning::default();
        let mut d = draw(YardState::Weld, &[10.0]);
        d.powered = false;
        assert!(tool_power(&d, &tuning).abs() < 1e-12);
    }

    #[test]
    fn locking_share_added_after_mobile_factor() {
        let tuning = Tuning::default();
        let mut d = draw(YardState::Grind, &[]);
        d.mobile = true;
        d.locking_share = 1.5;
        assert!((tool_power(&d, &tuning) - 11.5).abs() < 1e-12);

        let mut idle = draw(YardState::Disabled, &[]);
        idle.locking_share = 2.0;
        assert!((tool_power(&idle, &tuning) - 7.0).abs() < 1e-12);
    }
}
