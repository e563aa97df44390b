//! Thread-safe in-memory host for the CLI and integration tests.
//!
//! `SandboxWorld` is the read side handed to the session as its structure
//! provider. `SandboxTools` is the write side the runner applies effects
//! through; it owns the tool readings and mutates the world under its lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::DVec3;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use yard_core::geometry::OrientedBox;
use yard_core::{
    BlockPos, BlockRef, BlockView, ComponentCounts, MemoryWorld, SpeedMultipliers, StructureId,
    StructureProvider, StructureView, ToolControl, ToolId, WorkMode, WorkOrder, YardSpec,
};

#[derive(Debug, Default)]
pub struct SandboxWorld {
    world: RwLock<MemoryWorld>,
}

impl SandboxWorld {
    pub fn new(world: MemoryWorld) -> Self {
        Self {
            world: RwLock::new(world),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, MemoryWorld> {
        self.world.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, MemoryWorld> {
        self.world.write()
    }

    /// Move every drifting structure by its velocity.
    pub fn advance(&self, dt: f64) {
        self.world.write().advance(dt);
    }

    /// Break the blocks at `positions` off `old` into a fresh structure.
    pub fn split(&self, old: StructureId, positions: &[BlockPos]) -> Option<StructureId> {
        let mut world = self.world.write();
        let new = world.allocate_structure_id();
        world.split(old, new, positions).then_some(new)
    }

    pub fn block_count(&self, id: StructureId) -> usize {
        self.world.read().blocks(id).len()
    }
}

impl StructureProvider for SandboxWorld {
    fn structures_in(&self, region: &OrientedBox) -> Vec<StructureId> {
        self.world.read().structures_in(region)
    }

    fn structure(&self, id: StructureId) -> Option<StructureView> {
        self.world.read().structure(id)
    }

    fn blocks(&self, id: StructureId) -> Vec<BlockView> {
        self.world.read().blocks(id)
    }

    fn block(&self, block: BlockRef) -> Option<BlockView> {
        self.world.read().block(block)
    }

    fn inventory(&self, block: BlockRef) -> Option<ComponentCounts> {
        self.world.read().inventory(block)
    }

    fn inventories_connected(&self, a: BlockRef, b: BlockRef) -> bool {
        self.world.read().inventories_connected(a, b)
    }

    fn speed_multipliers(&self) -> SpeedMultipliers {
        self.world.read().speed_multipliers()
    }
}

/// Last values the scheduler set on a tool.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToolReading {
    pub enabled: bool,
    pub power_use: f64,
    pub max_power: f64,
    pub work_orders: u64,
}

#[derive(Debug)]
pub struct SandboxTools {
    world: Arc<SandboxWorld>,
    anchors: BTreeMap<ToolId, BlockRef>,
    readings: BTreeMap<ToolId, ToolReading>,
}

impl SandboxTools {
    pub fn new(world: Arc<SandboxWorld>) -> Self {
        Self {
            world,
            anchors: BTreeMap::new(),
            readings: BTreeMap::new(),
        }
    }

    /// Remember which block backs each of the yard's tools, so welding can
    /// draw from the inventories connected to it.
    pub fn attach_yard(&mut self, spec: &YardSpec) {
        for tool in &spec.tools {
            if let Some(block) = tool.block {
                self.anchors.insert(tool.id, block);
            }
        }
    }

    pub fn reading(&self, tool: ToolId) -> ToolReading {
        self.readings.get(&tool).copied().unwrap_or_default()
    }

    pub fn total_power(&self) -> f64 {
        self.readings.values().map(|r| r.power_use).sum()
    }

    fn cargo_for(&self, world: &MemoryWorld, tool: ToolId) -> Vec<BlockRef> {
        self.anchors
            .get(&tool)
            .map(|anchor| {
                world
                    .connected_inventories(*anchor)
                    .into_iter()
                    .filter(|b| b != anchor)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ToolControl for SandboxTools {
    fn enable_tool(&mut self, tool: ToolId) {
        self.readings.entry(tool).or_default().enabled = true;
    }

    fn set_power_use(&mut self, tool: ToolId, power: f64) {
        self.readings.entry(tool).or_default().power_use = power;
    }

    fn set_max_power(&mut self, tool: ToolId, power: f64) {
        self.readings.entry(tool).or_default().max_power = power;
    }

    fn apply_impulse(&mut self, structure: StructureId, impulse: DVec3, _at: DVec3) {
        let mut world = self.world.write();
        let Some(physics) = world.structure(structure).and_then(|s| s.physics) else {
            return;
        };
        if physics.is_static || physics.mass <= 0.0 {
            return;
        }
        world.set_velocity(structure, physics.linear_velocity + impulse / physics.mass);
    }

    fn apply_work(&mut self, order: &WorkOrder) {
        self.readings.entry(order.tool).or_default().work_orders += 1;
        let world = Arc::clone(&self.world);
        let mut world = world.write();
        let cargo = self.cargo_for(&world, order.tool);
        match order.mode {
            WorkMode::Weld => weld(&mut world, &cargo, order),
            WorkMode::Grind => grind(&mut world, &cargo, order),
            WorkMode::BuildProjected => build_projected(&mut world, order),
        }
    }
}

/// Share of the block's components that are installed.
fn installed_fraction(block: &BlockView) -> f32 {
    let total: u32 = block.components.values().sum();
    if total == 0 {
        return 1.0;
    }
    let missing: u32 = block.missing.values().sum();
    1.0 - missing.min(total) as f32 / total as f32
}

/// Pull missing components from `cargo`, then raise integrity up to what the
/// installed components allow.
fn weld(world: &mut MemoryWorld, cargo: &[BlockRef], order: &WorkOrder) {
    let Some(mut missing) = world.block(order.target).map(|b| b.missing) else {
        tracing::debug!(block = %order.target, "weld target vanished");
        return;
    };
    for inventory in cargo {
        if missing.is_empty() {
            break;
        }
        let Some(items) = world.inventory_mut(*inventory) else {
            continue;
        };
        missing.retain(|name, needed| {
            if let Some(have) = items.get_mut(name) {
                let taken = (*have).min(*needed);
                *have -= taken;
                *needed -= taken;
            }
            *needed > 0
        });
        items.retain(|_, count| *count > 0);
    }

    let Some(block) = world.block_mut(order.target) else {
        return;
    };
    block.missing = missing;
    let ceiling = (block.max_integrity * installed_fraction(block)).max(block.integrity);
    block.integrity = (block.integrity + order.amount).min(ceiling);
}

/// Lower integrity; at zero the block comes off and its installed components
/// go to the first connected cargo block.
fn grind(world: &mut MemoryWorld, cargo: &[BlockRef], order: &WorkOrder) {
    let Some(block) = world.block_mut(order.target) else {
        tracing::debug!(block = %order.target, "grind target vanished");
        return;
    };
    block.integrity = (block.integrity - order.amount).max(0.0);
    if block.integrity > 0.0 {
        return;
    }
    let Some(removed) = world.remove_block(order.target) else {
        return;
    };
    let mut salvage = removed.components.clone();
    for (name, count) in &removed.missing {
        if let Some(have) = salvage.get_mut(name) {
            *have = have.saturating_sub(*count);
        }
    }
    salvage.retain(|_, count| *count > 0);
    match cargo.first().and_then(|c| world.inventory_mut(*c)) {
        Some(items) => {
            for (name, count) in salvage {
                *items.entry(name).or_default() += count;
            }
        }
        None if !salvage.is_empty() => {
            tracing::debug!(block = %order.target, "no cargo for salvage, dropped");
        }
        None => {}
    }

    let structure = order.target.structure;
    if world.blocks(structure).is_empty() {
        world.close(structure);
        tracing::debug!(%structure, "structure ground away");
    }
}

/// Move a projected block into the projector's structure as a new, empty
/// frame that still needs welding.
fn build_projected(world: &mut MemoryWorld, order: &WorkOrder) {
    let Some(projector) = world
        .structure(order.target.structure)
        .and_then(|s| s.projection)
        .map(|p| p.projector)
    else {
        return;
    };
    let key = BlockRef::new(projector.structure, order.target.pos);
    if world.block(key).is_some() {
        tracing::warn!(block = %order.target, "projected block obstructed");
        return;
    }
    let Some(mut block) = world.remove_block(order.target) else {
        return;
    };
    block.block = key;
    block.buildable = false;
    block.integrity = order.amount.clamp(0.0, block.max_integrity);
    block.missing = block.components.clone();
    world.insert_block(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use yard_core::test_fixtures::{
        base_world, components, damaged_block, hull_block, insert_hull, projected_block,
        yard_spec, TOOL, YARD_STRUCTURE,
    };
    use yard_core::MemoryStructure;

    const HULL: StructureId = StructureId(2);
    const PROJECTION: StructureId = StructureId(3);

    fn target(pos: BlockPos) -> BlockRef {
        BlockRef::new(HULL, pos)
    }

    fn order(mode: WorkMode, target: BlockRef, amount: f32) -> WorkOrder {
        WorkOrder {
            tool: TOOL,
            beam: 0,
            target,
            mode,
            amount,
        }
    }

    /// Base world plus a damaged hull and a cargo block on the yard wired to
    /// the tool.
    fn sandbox(plates: u32) -> (Arc<SandboxWorld>, SandboxTools) {
        let mut world = base_world();
        let origin = BlockPos::new(0, 0, 0);
        insert_hull(
            &mut world,
            HULL,
            vec![damaged_block(HULL, origin, DVec3::new(10.0, 0.0, 0.0))],
        );
        let cargo = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 1, 0));
        world.insert_block(BlockView {
            kind: yard_core::BlockKind::Cargo,
            ..hull_block(YARD_STRUCTURE, cargo.pos, DVec3::new(0.0, 2.5, 0.0))
        });
        world.set_inventory(cargo, components(&[("SteelPlate", plates)]));
        world.connect(BlockRef::new(YARD_STRUCTURE, origin), cargo);

        let world = Arc::new(SandboxWorld::new(world));
        let mut tools = SandboxTools::new(Arc::clone(&world));
        tools.attach_yard(&yard_spec(true));
        (world, tools)
    }

    fn cargo_plates(world: &SandboxWorld) -> u32 {
        let cargo = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 1, 0));
        world
            .inventory(cargo)
            .and_then(|c| c.get("SteelPlate").copied())
            .unwrap_or(0)
    }

    #[test]
    fn test_weld_consumes_cargo_and_raises_integrity() {
        let (world, mut tools) = sandbox(20);
        let key = target(BlockPos::new(0, 0, 0));
        tools.apply_work(&order(WorkMode::Weld, key, 30.0));

        let block = world.block(key).unwrap();
        assert!(block.missing.is_empty());
        assert!((block.integrity - 40.0).abs() < 1e-6);
        assert_eq!(cargo_plates(&world), 15);
        assert_eq!(tools.reading(TOOL).work_orders, 1);
    }

    #[test]
    fn test_weld_without_parts_stops_at_installed_share() {
        let (world, mut tools) = sandbox(0);
        let key = target(BlockPos::new(0, 0, 0));
        tools.apply_work(&order(WorkMode::Weld, key, 80.0));

        let block = world.block(key).unwrap();
        // Half the plates are missing, so half the integrity is reachable.
        assert!((block.integrity - 50.0).abs() < 1e-6);
        assert_eq!(block.missing.get("SteelPlate"), Some(&5));
    }

    #[test]
    fn test_grind_removes_block_and_salvages() {
        let (world, mut tools) = sandbox(0);
        let key = target(BlockPos::new(0, 0, 0));
        tools.apply_work(&order(WorkMode::Grind, key, 4.0));
        assert!((world.block(key).unwrap().integrity - 6.0).abs() < 1e-6);

        tools.apply_work(&order(WorkMode::Grind, key, 10.0));
        assert!(world.block(key).is_none());
        assert_eq!(cargo_plates(&world), 5);
        assert!(world.structure(HULL).unwrap().closed);
    }

    #[test]
    fn test_build_projected_moves_block_to_projector_structure() {
        let (world, mut tools) = sandbox(0);
        let projector = BlockRef::new(HULL, BlockPos::new(0, 0, 0));
        let pos = BlockPos::new(1, 0, 0);
        {
            let mut w = world.write();
            w.insert_structure(PROJECTION, MemoryStructure::projection(projector));
            w.insert_block(projected_block(PROJECTION, pos, DVec3::new(12.5, 0.0, 0.0)));
        }

        let virtual_key = BlockRef::new(PROJECTION, pos);
        tools.apply_work(&order(WorkMode::BuildProjected, virtual_key, 1.0));

        assert!(world.block(virtual_key).is_none());
        let built = world.block(target(pos)).unwrap();
        assert!(!built.buildable);
        assert!(built.needs_welding());
        assert_eq!(built.missing, built.components);
        let projection = world.structure(PROJECTION).unwrap().projection.unwrap();
        assert_eq!(projection.remaining_blocks, 0);
    }

    #[test]
    fn test_impulse_changes_velocity_by_mass() {
        let (world, mut tools) = sandbox(0);
        tools.apply_impulse(HULL, DVec3::new(1000.0, 0.0, 0.0), DVec3::ZERO);
        let velocity = world.structure(HULL).unwrap().physics.unwrap().linear_velocity;
        assert!((velocity.x - 0.1).abs() < 1e-12);

        // Static structures ignore impulses.
        tools.apply_impulse(YARD_STRUCTURE, DVec3::X, DVec3::ZERO);
        let yard_velocity = world
            .structure(YARD_STRUCTURE)
            .unwrap()
            .physics
            .unwrap()
            .linear_velocity;
        assert!(yard_velocity.length() < 1e-12);
    }

    #[test]
    fn test_split_allocates_fresh_structure() {
        let (world, _tools) = sandbox(0);
        let fragment = world.split(HULL, &[BlockPos::new(0, 0, 0)]).unwrap();
        assert!(fragment.0 > HULL.0);
        assert_eq!(world.block_count(fragment), 1);
        assert_eq!(world.block_count(HULL), 0);
        assert!(world.split(HULL, &[BlockPos::new(5, 5, 5)]).is_none());
    }

    #[test]
    fn test_power_readings() {
        let (_world, mut tools) = sandbox(0);
        tools.enable_tool(TOOL);
        tools.set_power_use(TOOL, 42.0);
        tools.set_max_power(TOOL, 50.0);
        let reading = tools.reading(TOOL);
        assert!(reading.enabled);
        assert!((reading.power_use - 42.0).abs() < 1e-12);
        assert!((reading.max_power - 50.0).abs() < 1e-12);
        assert!((tools.total_power() - 42.0).abs() < 1e-12);
    }
}
