use glam::DVec3;

use crate::host::{Broadcast, ToolControl};
use crate::{BlockRef, StructureId, ToolId, WorkMode, YardId, YardState};

/// One beam's contribution for a single pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkOrder {
    pub tool: ToolId,
    pub beam: usize,
    pub target: BlockRef,
    pub mode: WorkMode,
    /// Integrity points to add (weld) or remove (grind).
    pub amount: f32,
}

/// Something a pass wants the host to do. Passes run off the simulation
/// thread, so they only describe side effects; the runner applies them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    YardState {
        yard: YardId,
        state: YardState,
    },
    ToolPower {
        tool: ToolId,
        power: f64,
    },
    /// Reset the tool's power use and ceiling and detach it from the yard.
    ToolPowerFloor {
        tool: ToolId,
        power: f64,
    },
    EnableTool {
        tool: ToolId,
    },
    Impulse {
        structure: StructureId,
        impulse: DVec3,
        at: DVec3,
    },
    Work(WorkOrder),
}

impl Effect {
    pub fn apply(&self, tools: &mut dyn ToolControl, broadcast: &dyn Broadcast) {
        match self {
            Effect::YardState { yard, state } => broadcast.yard_state(*yard, *state),
            Effect::ToolPower { tool, power } => {
                tools.set_power_use(*tool, *power);
                broadcast.tool_power(*tool, *power);
            }
            Effect::ToolPowerFloor { tool, power } => {
                tools.set_power_use(*tool, *power);
                tools.set_max_power(*tool, *power);
            }
            Effect::EnableTool { tool } => tools.enable_tool(*tool),
            Effect::Impulse {
                structure,
                impulse,
                at,
            } => tools.apply_impulse(*structure, *impulse, *at),
            Effect::Work(order) => tools.apply_work(order),
        }
    }
}

/// Ordered effect buffer filled during a pass.
#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn extend(&mut self, effects: impl IntoIterator<Item = Effect>) {
        self.effects.extend(effects);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn take(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Number of state broadcasts queued for `yard`.
    pub fn state_broadcasts(&self, yard: YardId) -> usize {
        self.effects
            .iter()
            .filter(|e| matches!(e, Effect::YardState { yard: y, .. } if *y == yard))
            .count()
    }
}
