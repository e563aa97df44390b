//! Collaborator contracts. The host engine implements these; the scheduler
//! never owns a structure and treats every lookup as possibly stale.

use glam::DVec3;

use crate::effects::WorkOrder;
use crate::geometry::OrientedBox;
use crate::settings::YardSettings;
use crate::{
    BlockRef, BlockView, ComponentCounts, SpeedMultipliers, StructureId, StructureView, ToolId,
    YardId, YardState,
};

/// Read-only access to the world. Called from worker threads.
pub trait StructureProvider: Send + Sync {
    /// Structures whose bounds come near `region`. May include closed ones.
    fn structures_in(&self, region: &OrientedBox) -> Vec<StructureId>;

    /// `None` once the structure has been removed from the world.
    fn structure(&self, id: StructureId) -> Option<StructureView>;

    fn blocks(&self, id: StructureId) -> Vec<BlockView>;

    fn block(&self, block: BlockRef) -> Option<BlockView>;

    /// Contents of the block's inventory, `None` if it has none.
    fn inventory(&self, block: BlockRef) -> Option<ComponentCounts>;

    /// Whether items can flow between the two blocks' inventories.
    fn inventories_connected(&self, a: BlockRef, b: BlockRef) -> bool;

    fn speed_multipliers(&self) -> SpeedMultipliers;
}

/// Fire-and-forget notifications to peers. No acknowledgement is awaited.
pub trait Broadcast: Send + Sync {
    fn yard_state(&self, yard: YardId, state: YardState);
    fn tool_power(&self, tool: ToolId, power: f64);
    fn settings_changed(&self, yard: YardId, settings: &YardSettings);
}

/// Broadcast sink for single-player sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcast;

impl Broadcast for NullBroadcast {
    fn yard_state(&self, _yard: YardId, _state: YardState) {}
    fn tool_power(&self, _tool: ToolId, _power: f64) {}
    fn settings_changed(&self, _yard: YardId, _settings: &YardSettings) {}
}

/// Mutations on host-owned tool blocks and physics. Only ever called on the
/// simulation thread.
pub trait ToolControl {
    fn enable_tool(&mut self, tool: ToolId);
    fn set_power_use(&mut self, tool: ToolId, power: f64);
    fn set_max_power(&mut self, tool: ToolId, power: f64);
    fn apply_impulse(&mut self, structure: StructureId, impulse: DVec3, at: DVec3);
    fn apply_work(&mut self, order: &WorkOrder);
}
