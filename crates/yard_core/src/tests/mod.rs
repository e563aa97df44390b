use super::*;
use crate::classify::classify;
use crate::test_fixtures::{
    base_world, base_yard, damaged_hull_at, detect, full_power_settings, hull_block, insert_hull,
    tick_context, TOOL, YARD, YARD_STRUCTURE,
};
use glam::{DQuat, DVec3};

mod allocation;
mod lifecycle;

// --- Shared test helpers ------------------------------------------------

const HULL: StructureId = StructureId(2);

fn power_at(distances: &[f64]) -> f64 {
    let tuning = Tuning::default();
    tuning.idle_power
        + distances
            .iter()
            .map(|d| power::beam_power(*d, 1.0, &tuning))
            .sum::<f64>()
}

/// Detect, then run one pass at `now_ms` with the given transition queued.
fn pass(
    yard: &mut Yard,
    world: &MemoryWorld,
    splits: &mut SplitRegistry,
    transition: Option<Transition>,
    now_ms: u64,
) -> Outbox {
    let tuning = Tuning::default();
    detect(yard, world, splits);
    if let Some(t) = transition {
        yard.request(t);
    }
    let mut out = Outbox::new();
    let mut ctx = tick_context(world, splits, &tuning, now_ms);
    yard.tick(&mut ctx, &mut out);
    out
}

fn tool_powers(out: &Outbox) -> Vec<f64> {
    out.iter()
        .filter_map(|e| match e {
            Effect::ToolPower { power, .. } => Some(*power),
            _ => None,
        })
        .collect()
}
