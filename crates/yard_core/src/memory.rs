//! In-memory structure model. Backs the sandbox host and the test fixtures.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::geometry::OrientedBox;
use crate::host::StructureProvider;
use crate::{
    BlockPos, BlockRef, BlockView, ComponentCounts, PhysicsState, ProjectionInfo,
    SpeedMultipliers, StructureId, StructureView,
};

/// Half the edge length of a large block.
const BLOCK_HALF_SIZE: f64 = 1.25;

/// Broad-phase slack for `structures_in`.
const QUERY_INFLATION: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStructure {
    pub bounds: OrientedBox,
    pub physics: Option<PhysicsState>,
    /// Projector that owns this structure, for projections.
    pub projector: Option<BlockRef>,
    pub closed: bool,
    pub blocks: BTreeMap<BlockPos, BlockView>,
}

impl MemoryStructure {
    pub fn physical(mass: f64, is_static: bool) -> Self {
        Self {
            bounds: OrientedBox::axis_aligned(DVec3::ZERO, DVec3::splat(BLOCK_HALF_SIZE)),
            physics: Some(PhysicsState {
                linear_velocity: DVec3::ZERO,
                mass,
                center_of_mass: DVec3::ZERO,
                is_static,
            }),
            projector: None,
            closed: false,
            blocks: BTreeMap::new(),
        }
    }

    pub fn projection(projector: BlockRef) -> Self {
        Self {
            physics: None,
            projector: Some(projector),
            ..Self::physical(0.0, true)
        }
    }

    /// Axis-aligned bounds around the block centers, one block thick at the
    /// edges. Also moves the center of mass to the block centroid.
    pub fn recompute_bounds(&mut self) {
        let positions: Vec<DVec3> = self.blocks.values().map(|b| b.position).collect();
        let Some(bounds) = OrientedBox::enclosing(
            &positions,
            glam::DQuat::IDENTITY,
            BLOCK_HALF_SIZE,
        ) else {
            return;
        };
        self.bounds = bounds;
        if let Some(physics) = self.physics.as_mut() {
            let count = positions.len() as f64;
            physics.center_of_mass = positions.iter().copied().sum::<DVec3>() / count;
        }
    }

    fn view(&self, id: StructureId) -> StructureView {
        #[allow(clippy::cast_possible_truncation)]
        let remaining = self.blocks.len() as u32;
        StructureView {
            id,
            bounds: self.bounds,
            physics: self.physics,
            projection: self.projector.map(|projector| ProjectionInfo {
                projector,
                remaining_blocks: remaining,
            }),
            closed: self.closed,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    structures: BTreeMap<StructureId, MemoryStructure>,
    inventories: BTreeMap<BlockRef, ComponentCounts>,
    /// Conveyor network label per block; equal labels are connected.
    conveyor_groups: BTreeMap<BlockRef, u32>,
    next_group: u32,
    speed: SpeedMultipliers,
    next_structure: u64,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_speed(&mut self, speed: SpeedMultipliers) {
        self.speed = speed;
    }

    pub fn insert_structure(&mut self, id: StructureId, structure: MemoryStructure) {
        self.next_structure = self.next_structure.max(id.0 + 1);
        self.structures.insert(id, structure);
    }

    /// Id not used by any structure so far.
    pub fn allocate_structure_id(&mut self) -> StructureId {
        let id = StructureId(self.next_structure.max(1));
        self.next_structure = id.0 + 1;
        id
    }

    pub fn remove_structure(&mut self, id: StructureId) -> Option<MemoryStructure> {
        self.inventories.retain(|block, _| block.structure != id);
        self.conveyor_groups.retain(|block, _| block.structure != id);
        self.structures.remove(&id)
    }

    pub fn structure_mut(&mut self, id: StructureId) -> Option<&mut MemoryStructure> {
        self.structures.get_mut(&id)
    }

    pub fn structure_ids(&self) -> impl Iterator<Item = StructureId> + '_ {
        self.structures.keys().copied()
    }

    pub fn close(&mut self, id: StructureId) {
        if let Some(structure) = self.structures.get_mut(&id) {
            structure.closed = true;
        }
    }

    /// Insert or replace a block. The block's own `block` field decides where
    /// it goes. Returns false if the structure does not exist.
    pub fn insert_block(&mut self, block: BlockView) -> bool {
        let Some(structure) = self.structures.get_mut(&block.block.structure) else {
            return false;
        };
        structure.blocks.insert(block.block.pos, block);
        structure.recompute_bounds();
        true
    }

    pub fn remove_block(&mut self, block: BlockRef) -> Option<BlockView> {
        let structure = self.structures.get_mut(&block.structure)?;
        let removed = structure.blocks.remove(&block.pos)?;
        structure.recompute_bounds();
        self.inventories.remove(&block);
        self.conveyor_groups.remove(&block);
        Some(removed)
    }

    pub fn block_mut(&mut self, block: BlockRef) -> Option<&mut BlockView> {
        self.structures
            .get_mut(&block.structure)?
            .blocks
            .get_mut(&block.pos)
    }

    pub fn set_inventory(&mut self, block: BlockRef, contents: ComponentCounts) {
        self.inventories.insert(block, contents);
    }

    pub fn inventory_mut(&mut self, block: BlockRef) -> Option<&mut ComponentCounts> {
        self.inventories.get_mut(&block)
    }

    /// Join the conveyor networks of `a` and `b`.
    pub fn connect(&mut self, a: BlockRef, b: BlockRef) {
        let group_a = self.conveyor_groups.get(&a).copied();
        let group_b = self.conveyor_groups.get(&b).copied();
        match (group_a, group_b) {
            (Some(ga), Some(gb)) if ga != gb => {
                for group in self.conveyor_groups.values_mut() {
                    if *group == gb {
                        *group = ga;
                    }
                }
            }
            (Some(_), Some(_)) => {}
            (Some(g), None) => {
                self.conveyor_groups.insert(b, g);
            }
            (None, Some(g)) => {
                self.conveyor_groups.insert(a, g);
            }
            (None, None) => {
                let g = self.next_group;
                self.next_group += 1;
                self.conveyor_groups.insert(a, g);
                self.conveyor_groups.insert(b, g);
            }
        }
    }

    /// Blocks whose inventories are reachable from `from`, including itself.
    pub fn connected_inventories(&self, from: BlockRef) -> Vec<BlockRef> {
        self.inventories
            .keys()
            .copied()
            .filter(|b| self.inventories_connected(from, *b))
            .collect()
    }

    /// Move the blocks at `positions` out of `old` into a new structure `new`
    /// that inherits the parent's velocity. Mass is shared by block count.
    /// Returns false when `old` is unknown or nothing moved.
    pub fn split(&mut self, old: StructureId, new: StructureId, positions: &[BlockPos]) -> bool {
        let Some(parent) = self.structures.get_mut(&old) else {
            return false;
        };
        let before = parent.blocks.len();
        let mut moved = BTreeMap::new();
        for pos in positions {
            if let Some(mut block) = parent.blocks.remove(pos) {
                block.block.structure = new;
                moved.insert(*pos, block);
            }
        }
        if moved.is_empty() {
            return false;
        }
        let mut fragment = MemoryStructure {
            blocks: moved,
            ..parent.clone()
        };
        if let (Some(parent_physics), Some(frag_physics)) =
            (parent.physics.as_mut(), fragment.physics.as_mut())
        {
            let share = fragment.blocks.len() as f64 / before as f64;
            frag_physics.mass = parent_physics.mass * share;
            parent_physics.mass -= frag_physics.mass;
        }
        parent.recompute_bounds();
        fragment.recompute_bounds();

        let rekey = |map_key: &BlockRef| {
            if map_key.structure == old && fragment.blocks.contains_key(&map_key.pos) {
                Some(BlockRef::new(new, map_key.pos))
            } else {
                None
            }
        };
        let inventories: Vec<_> = self.inventories.keys().filter_map(rekey).collect();
        for target in inventories {
            if let Some(items) = self.inventories.remove(&BlockRef::new(old, target.pos)) {
                self.inventories.insert(target, items);
            }
        }
        let grouped: Vec<_> = self.conveyor_groups.keys().filter_map(rekey).collect();
        for target in grouped {
            if let Some(group) = self.conveyor_groups.remove(&BlockRef::new(old, target.pos)) {
                self.conveyor_groups.insert(target, group);
            }
        }

        self.insert_structure(new, fragment);
        true
    }

    /// Move a whole structure by `offset`.
    pub fn translate(&mut self, id: StructureId, offset: DVec3) {
        let Some(structure) = self.structures.get_mut(&id) else {
            return;
        };
        structure.bounds.center += offset;
        if let Some(physics) = structure.physics.as_mut() {
            physics.center_of_mass += offset;
        }
        for block in structure.blocks.values_mut() {
            block.position += offset;
        }
    }

    pub fn set_velocity(&mut self, id: StructureId, velocity: DVec3) {
        if let Some(physics) = self
            .structures
            .get_mut(&id)
            .and_then(|s| s.physics.as_mut())
        {
            physics.linear_velocity = velocity;
        }
    }

    /// Translate every moving physical structure by `velocity × dt`.
    pub fn advance(&mut self, dt: f64) {
        let moving: Vec<(StructureId, DVec3)> = self
            .structures
            .iter()
            .filter_map(|(id, s)| s.physics.map(|p| (*id, p)))
            .filter(|(_, p)| !p.is_static && p.linear_velocity != DVec3::ZERO)
            .map(|(id, p)| (id, p.linear_velocity * dt))
            .collect();
        for (id, offset) in moving {
            self.translate(id, offset);
        }
    }
}

impl StructureProvider for MemoryWorld {
    fn structures_in(&self, region: &OrientedBox) -> Vec<StructureId> {
        let broad = region.inflated(QUERY_INFLATION);
        self.structures
            .iter()
            .filter(|(_, s)| broad.intersects(&s.bounds))
            .map(|(id, _)| *id)
            .collect()
    }

    fn structure(&self, id: StructureId) -> Option<StructureView> {
        self.structures.get(&id).map(|s| s.view(id))
    }

    fn blocks(&self, id: StructureId) -> Vec<BlockView> {
        self.structures
            .get(&id)
            .map(|s| s.blocks.values().cloned().collect())
            .unwrap_or_default()
    }

    fn block(&self, block: BlockRef) -> Option<BlockView> {
        self.structures
            .get(&block.structure)?
            .blocks
            .get(&block.pos)
            .cloned()
    }

    fn inventory(&self, block: BlockRef) -> Option<ComponentCounts> {
        self.inventories.get(&block).cloned()
    }

    fn inventories_connected(&self, a: BlockRef, b: BlockRef) -> bool {
        if a == b {
            return true;
        }
        match (self.conveyor_groups.get(&a), self.conveyor_groups.get(&b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }

    fn speed_multipliers(&self) -> SpeedMultipliers {
        self.speed
    }
}
