//! Seeded random scenarios for smoke runs and benchmarks.

use glam::{DQuat, DVec3};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use yard_core::{
    BlockKind, BlockPos, BlockRef, ComponentCounts, OrientedBox, SpeedMultipliers, StructureId,
    ToolId, ToolSlot, YardId, YardSettings, YardSpec, YardState, MAX_MULTIPLIER,
};

use crate::scenario::{BlockDef, InitialCommand, InventoryDef, Scenario, StructureDef};
use crate::settings_store::SettingsEntry;

pub const SCRAPYARD_HALF_EXTENT: f64 = 40.0;
pub const SCRAPYARD_YARD: YardId = YardId(1);

const YARD_STRUCTURE: StructureId = StructureId(1);
/// Debris centers stay this far inside the yard so whole hulls fit.
const DEBRIS_SPREAD: f64 = 24.0;
const BLOCK_SPACING: f64 = 2.5;
const PALETTE: [(&str, u32, u32); 4] = [
    ("SteelPlate", 5, 25),
    ("InteriorPlate", 2, 10),
    ("Construction", 2, 8),
    ("MetalGrid", 1, 4),
];

fn counts(entries: &[(&str, u32)]) -> ComponentCounts {
    entries
        .iter()
        .map(|(name, count)| ((*name).to_string(), *count))
        .collect()
}

fn yard_block(pos: BlockPos, kind: BlockKind, position: DVec3) -> BlockDef {
    BlockDef {
        pos,
        kind,
        position,
        max_integrity: 200.0,
        integrity: None,
        integrity_per_sec: 20.0,
        components: counts(&[("SteelPlate", 20), ("Construction", 5)]),
        missing: ComponentCounts::new(),
        buildable: false,
    }
}

/// Static yard with two tools and a stocked cargo block, surrounded by a
/// random field of damaged debris. The same seed always yields the same
/// scenario.
pub fn generate_scrapyard(seed: u64) -> Scenario {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let tools = [
        (ToolId(1), BlockPos::new(-6, 0, 0), DVec3::new(-15.0, 0.0, 0.0)),
        (ToolId(2), BlockPos::new(6, 0, 0), DVec3::new(15.0, 0.0, 0.0)),
    ];
    let cargo = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, -2, 0));

    let mut yard_blocks: Vec<BlockDef> = tools
        .iter()
        .map(|(_, pos, position)| yard_block(*pos, BlockKind::Tool, *position))
        .collect();
    yard_blocks.push(yard_block(cargo.pos, BlockKind::Cargo, DVec3::new(0.0, -5.0, 0.0)));

    let mut structures = vec![StructureDef {
        id: YARD_STRUCTURE,
        mass: 2_000_000.0,
        is_static: true,
        velocity: DVec3::ZERO,
        projector: None,
        blocks: yard_blocks,
    }];
    let debris_count = rng.gen_range(4..=8u64);
    for index in 0..debris_count {
        structures.push(debris(&mut rng, StructureId(2 + index)));
    }

    let inventories = vec![InventoryDef {
        block: cargo,
        contents: counts(&[
            ("SteelPlate", rng.gen_range(200..=400)),
            ("InteriorPlate", rng.gen_range(100..=200)),
            ("Construction", 100),
            ("MetalGrid", 50),
        ]),
    }];
    let conveyors = tools
        .iter()
        .map(|(_, pos, _)| (cargo, BlockRef::new(YARD_STRUCTURE, *pos)))
        .collect();

    let yard = YardSpec {
        id: SCRAPYARD_YARD,
        structure: YARD_STRUCTURE,
        tools: tools
            .iter()
            .map(|(id, pos, position)| {
                ToolSlot::new(*id, BlockRef::new(YARD_STRUCTURE, *pos), *position)
            })
            .collect(),
        is_static: true,
        orientation: DQuat::IDENTITY,
        volume: Some(OrientedBox::axis_aligned(
            DVec3::ZERO,
            DVec3::splat(SCRAPYARD_HALF_EXTENT),
        )),
    };

    Scenario {
        speed: SpeedMultipliers::default(),
        structures,
        inventories,
        conveyors,
        yards: vec![yard],
        settings: vec![SettingsEntry {
            yard: SCRAPYARD_YARD,
            settings: YardSettings {
                beam_count: 4,
                grind_multiplier: MAX_MULTIPLIER,
                ..YardSettings::default()
            },
        }],
        command: Some(InitialCommand {
            yard: SCRAPYARD_YARD,
            state: YardState::Grind,
        }),
    }
}

/// A short row of damaged blocks at a random spot inside the yard.
fn debris(rng: &mut ChaCha8Rng, id: StructureId) -> StructureDef {
    let center = DVec3::new(
        rng.gen_range(-DEBRIS_SPREAD..=DEBRIS_SPREAD),
        rng.gen_range(-DEBRIS_SPREAD..=DEBRIS_SPREAD),
        rng.gen_range(-DEBRIS_SPREAD..=DEBRIS_SPREAD),
    );
    let block_count = rng.gen_range(1..=5i32);
    let blocks = (0..block_count)
        .map(|i| {
            let kinds = rng.gen_range(1..=2usize);
            let picked: Vec<(&str, u32)> = PALETTE
                .choose_multiple(&mut *rng, kinds)
                .map(|(name, lo, hi)| (*name, rng.gen_range(*lo..=*hi)))
                .collect();
            let built: f32 = rng.gen_range(0.1..=1.0);
            let missing = picked
                .iter()
                .map(|(name, count)| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let gone = (*count as f32 * (1.0 - built)).floor() as u32;
                    (*name, gone)
                })
                .filter(|(_, gone)| *gone > 0)
                .collect::<Vec<_>>();
            BlockDef {
                pos: BlockPos::new(i, 0, 0),
                kind: BlockKind::Structural,
                position: center + DVec3::X * f64::from(i) * BLOCK_SPACING,
                max_integrity: 100.0,
                integrity: Some(100.0 * built),
                integrity_per_sec: rng.gen_range(5.0..=20.0),
                components: counts(&picked),
                missing: counts(&missing),
                buildable: false,
            }
        })
        .collect::<Vec<_>>();
    StructureDef {
        id,
        mass: 500.0 * f64::from(block_count),
        is_static: false,
        velocity: DVec3::ZERO,
        projector: None,
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yard_core::StructureProvider;

    #[test]
    fn test_same_seed_same_scrapyard() {
        assert_eq!(generate_scrapyard(42), generate_scrapyard(42));
        assert_ne!(generate_scrapyard(42), generate_scrapyard(43));
    }

    #[test]
    fn test_scrapyard_is_valid_and_inside_the_yard() {
        for seed in 0..20 {
            let scenario = generate_scrapyard(seed);
            scenario.validate().unwrap();
            let volume = scenario.yards[0].volume.unwrap();
            let world = scenario.build_world();
            for def in &scenario.structures[1..] {
                let view = world.structure(def.id).unwrap();
                assert!(
                    volume.contains_box(&view.bounds),
                    "seed {seed}: structure {} pokes out of the yard",
                    def.id
                );
                assert!(def.blocks.iter().all(|b| b.integrity.unwrap() > 0.0));
            }
        }
    }

    #[test]
    fn test_cargo_feeds_both_tools() {
        let world = generate_scrapyard(7).build_world();
        let cargo = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, -2, 0));
        for pos in [BlockPos::new(-6, 0, 0), BlockPos::new(6, 0, 0)] {
            assert!(world.inventories_connected(BlockRef::new(YARD_STRUCTURE, pos), cargo));
        }
        assert!(world.inventory(cargo).is_some_and(|c| c["SteelPlate"] >= 200));
    }
}
