//! Shared test fixtures for yard_core and downstream crates.
//!
//! `base_world()` holds the yard's own structure with a single tool block at
//! the origin. `yard_spec()` registers a yard around that tool with a 60 m
//! cube volume, so hulls placed within 25 m of the origin are contained.

use std::collections::BTreeMap;
use std::time::Duration;

use glam::{DQuat, DVec3};

use crate::classify::{classify_nearby, ClassifyDelta};
use crate::{
    BlockKind, BlockPos, BlockRef, BlockView, ComponentCounts, MemoryStructure, MemoryWorld,
    OrientedBox, SplitRegistry, StructureId, StructureProvider, TickContext, ToolId, ToolSlot,
    Tuning, Yard, YardId, YardSettings, YardSpec,
};

pub const YARD: YardId = YardId(1);
pub const YARD_STRUCTURE: StructureId = StructureId(1);
pub const TOOL: ToolId = ToolId(1);
pub const YARD_HALF_EXTENT: f64 = 30.0;

pub fn components(entries: &[(&str, u32)]) -> ComponentCounts {
    entries
        .iter()
        .map(|(name, count)| ((*name).to_string(), *count))
        .collect()
}

/// Finished hull block: 100 integrity, 10 per second, 10 steel plates.
pub fn hull_block(structure: StructureId, pos: BlockPos, position: DVec3) -> BlockView {
    BlockView {
        block: BlockRef::new(structure, pos),
        kind: BlockKind::Structural,
        position,
        integrity: 100.0,
        max_integrity: 100.0,
        integrity_per_sec: 10.0,
        components: components(&[("SteelPlate", 10)]),
        missing: ComponentCounts::new(),
        buildable: false,
    }
}

/// Hull block at 10% integrity, missing 5 steel plates.
pub fn damaged_block(structure: StructureId, pos: BlockPos, position: DVec3) -> BlockView {
    BlockView {
        integrity: 10.0,
        missing: components(&[("SteelPlate", 5)]),
        ..hull_block(structure, pos, position)
    }
}

/// Buildable block of a projection.
pub fn projected_block(structure: StructureId, pos: BlockPos, position: DVec3) -> BlockView {
    BlockView {
        integrity: 0.0,
        missing: components(&[("SteelPlate", 10)]),
        buildable: true,
        ..hull_block(structure, pos, position)
    }
}

pub fn tool_block(structure: StructureId, pos: BlockPos, position: DVec3) -> BlockView {
    BlockView {
        kind: BlockKind::Tool,
        ..hull_block(structure, pos, position)
    }
}

/// World with the yard structure (static) and one tool block at the origin.
pub fn base_world() -> MemoryWorld {
    let mut world = MemoryWorld::new();
    world.insert_structure(YARD_STRUCTURE, MemoryStructure::physical(1_000_000.0, true));
    world.insert_block(tool_block(YARD_STRUCTURE, BlockPos::new(0, 0, 0), DVec3::ZERO));
    world
}

/// Insert a free-floating physical structure made of `blocks`.
pub fn insert_hull(world: &mut MemoryWorld, id: StructureId, blocks: Vec<BlockView>) {
    world.insert_structure(id, MemoryStructure::physical(10_000.0, false));
    for block in blocks {
        world.insert_block(block);
    }
}

/// Hull of damaged blocks laid out along +x at the given distances.
pub fn damaged_hull_at(world: &mut MemoryWorld, id: StructureId, distances: &[f64]) {
    let blocks = distances
        .iter()
        .enumerate()
        .map(|(i, d)| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let pos = BlockPos::new(i as i32, 0, 0);
            damaged_block(id, pos, DVec3::new(*d, 0.0, 0.0))
        })
        .collect();
    insert_hull(world, id, blocks);
}

pub fn tool_slot() -> ToolSlot {
    ToolSlot::new(
        TOOL,
        BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 0, 0)),
        DVec3::ZERO,
    )
}

pub fn yard_spec(is_static: bool) -> YardSpec {
    YardSpec {
        id: YARD,
        structure: YARD_STRUCTURE,
        tools: vec![tool_slot()],
        is_static,
        orientation: DQuat::IDENTITY,
        volume: Some(OrientedBox::axis_aligned(
            DVec3::ZERO,
            DVec3::splat(YARD_HALF_EXTENT),
        )),
    }
}

/// Settings with full multipliers so power numbers are easy to check.
pub fn full_power_settings(beam_count: u8) -> YardSettings {
    YardSettings {
        beam_count,
        weld_multiplier: 1.0,
        grind_multiplier: 1.0,
        ..YardSettings::default()
    }
}

pub fn base_yard(is_static: bool, settings: YardSettings) -> Yard {
    Yard::new(yard_spec(is_static), settings, &Tuning::default())
}

pub fn tick_context<'a>(
    provider: &'a dyn StructureProvider,
    splits: &'a mut SplitRegistry,
    tuning: &'a Tuning,
    now_ms: u64,
) -> TickContext<'a> {
    TickContext {
        provider,
        splits,
        tuning,
        now: Duration::from_millis(now_ms),
        dt: 0.1,
        authoritative: true,
    }
}

/// Run one detection step on `yard` against `provider`.
pub fn detect(
    yard: &mut Yard,
    provider: &dyn StructureProvider,
    splits: &mut SplitRegistry,
) -> ClassifyDelta {
    yard.refresh_tools(provider);
    let classification = classify_nearby(provider, yard.bounds(), yard.structure());
    yard.apply_classification(classification, splits)
}

/// Settings map with one entry, for store tests.
pub fn settings_map(yard: YardId, settings: YardSettings) -> BTreeMap<YardId, YardSettings> {
    BTreeMap::from([(yard, settings)])
}
