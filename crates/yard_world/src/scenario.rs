//! Scenario files: the starting world, the yards in it and an optional
//! opening command.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use yard_core::{
    BlockKind, BlockPos, BlockRef, BlockView, ComponentCounts, MemoryStructure, MemoryWorld,
    SpeedMultipliers, StructureId, YardId, YardSettings, YardSpec, YardState,
};

use crate::settings_store::SettingsEntry;

fn default_max_integrity() -> f32 {
    100.0
}

fn default_integrity_per_sec() -> f32 {
    10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    pub pos: BlockPos,
    #[serde(default)]
    pub kind: BlockKind,
    pub position: DVec3,
    #[serde(default = "default_max_integrity")]
    pub max_integrity: f32,
    /// Defaults to `max_integrity`.
    #[serde(default)]
    pub integrity: Option<f32>,
    #[serde(default = "default_integrity_per_sec")]
    pub integrity_per_sec: f32,
    #[serde(default)]
    pub components: ComponentCounts,
    #[serde(default)]
    pub missing: ComponentCounts,
    #[serde(default)]
    pub buildable: bool,
}

impl BlockDef {
    pub fn view(&self, structure: StructureId) -> BlockView {
        BlockView {
            block: BlockRef::new(structure, self.pos),
            kind: self.kind,
            position: self.position,
            integrity: self.integrity.unwrap_or(self.max_integrity),
            max_integrity: self.max_integrity,
            integrity_per_sec: self.integrity_per_sec,
            components: self.components.clone(),
            missing: self.missing.clone(),
            buildable: self.buildable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureDef {
    pub id: StructureId,
    #[serde(default)]
    pub mass: f64,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub velocity: DVec3,
    /// Set for projections: the projector block that owns them.
    #[serde(default)]
    pub projector: Option<BlockRef>,
    pub blocks: Vec<BlockDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDef {
    pub block: BlockRef,
    pub contents: ComponentCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCommand {
    pub yard: YardId,
    pub state: YardState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub speed: SpeedMultipliers,
    pub structures: Vec<StructureDef>,
    #[serde(default)]
    pub inventories: Vec<InventoryDef>,
    /// Pairs of blocks joined into one conveyor network.
    #[serde(default)]
    pub conveyors: Vec<(BlockRef, BlockRef)>,
    pub yards: Vec<YardSpec>,
    #[serde(default)]
    pub settings: Vec<SettingsEntry>,
    #[serde(default)]
    pub command: Option<InitialCommand>,
}

impl Scenario {
    /// Check every cross-reference in the file.
    pub fn validate(&self) -> Result<()> {
        let mut structures = BTreeSet::new();
        let mut blocks = BTreeSet::new();
        for structure in &self.structures {
            ensure!(
                structures.insert(structure.id),
                "structure {} defined twice",
                structure.id
            );
            for block in &structure.blocks {
                ensure!(
                    blocks.insert(BlockRef::new(structure.id, block.pos)),
                    "structure {} has two blocks at {:?}",
                    structure.id,
                    block.pos
                );
                ensure!(
                    block.max_integrity > 0.0,
                    "block {} has non-positive max integrity",
                    BlockRef::new(structure.id, block.pos)
                );
            }
        }
        for structure in &self.structures {
            if let Some(projector) = structure.projector {
                ensure!(
                    blocks.contains(&projector),
                    "projection {} references unknown projector {projector}",
                    structure.id
                );
            }
        }
        for inventory in &self.inventories {
            ensure!(
                blocks.contains(&inventory.block),
                "inventory on unknown block {}",
                inventory.block
            );
        }
        for (a, b) in &self.conveyors {
            ensure!(
                blocks.contains(a) && blocks.contains(b),
                "conveyor {a} -> {b} references an unknown block"
            );
        }

        let mut yards = BTreeSet::new();
        for yard in &self.yards {
            ensure!(yards.insert(yard.id), "yard {} defined twice", yard.id);
            ensure!(
                structures.contains(&yard.structure),
                "yard {} sits on unknown structure {}",
                yard.id,
                yard.structure
            );
            for tool in &yard.tools {
                let Some(block) = tool.block else {
                    continue;
                };
                ensure!(
                    block.structure == yard.structure && blocks.contains(&block),
                    "yard {} tool {} is not backed by a block of its structure",
                    yard.id,
                    tool.id
                );
            }
        }
        for entry in &self.settings {
            ensure!(
                yards.contains(&entry.yard),
                "settings for unknown yard {}",
                entry.yard
            );
        }
        if let Some(command) = self.command {
            if !yards.contains(&command.yard) {
                bail!("initial command for unknown yard {}", command.yard);
            }
        }
        Ok(())
    }

    pub fn build_world(&self) -> MemoryWorld {
        let mut world = MemoryWorld::new();
        world.set_speed(self.speed);
        for def in &self.structures {
            let structure = match def.projector {
                Some(projector) => MemoryStructure::projection(projector),
                None => MemoryStructure::physical(def.mass, def.is_static),
            };
            world.insert_structure(def.id, structure);
            for block in &def.blocks {
                world.insert_block(block.view(def.id));
            }
            world.set_velocity(def.id, def.velocity);
        }
        for inventory in &self.inventories {
            world.set_inventory(inventory.block, inventory.contents.clone());
        }
        for (a, b) in &self.conveyors {
            world.connect(*a, *b);
        }
        world
    }

    pub fn settings_map(&self) -> BTreeMap<YardId, YardSettings> {
        self.settings
            .iter()
            .map(|e| (e.yard, e.settings.clone()))
            .collect()
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let name = path.display();
    let scenario: Scenario = serde_json::from_str(
        &std::fs::read_to_string(path).with_context(|| format!("reading {name}"))?,
    )
    .with_context(|| format!("parsing {name}"))?;
    scenario
        .validate()
        .with_context(|| format!("validating {name}"))?;
    tracing::info!(
        scenario = %name,
        structures = scenario.structures.len(),
        yards = scenario.yards.len(),
        "scenario loaded"
    );
    Ok(scenario)
}
