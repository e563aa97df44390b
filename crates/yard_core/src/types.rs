//! Type definitions for `yard_core`.
//!
//! Identifier newtypes, lifecycle enums and the read-only views the host
//! hands out for structures and blocks.

use std::collections::BTreeMap;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::geometry::OrientedBox;

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

pub type ComponentKind = String;
pub type ComponentCounts = BTreeMap<ComponentKind, u32>;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(YardId);
entity_id!(StructureId);
entity_id!(ToolId);

/// Grid coordinates of a block inside its structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A block addressed by its owning structure. Doubles as the target key:
/// virtual blocks live in their projection's structure, so keys never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub structure: StructureId,
    pub pos: BlockPos,
}

impl BlockRef {
    pub const fn new(structure: StructureId, pos: BlockPos) -> Self {
        Self { structure, pos }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@({},{},{})",
            self.structure, self.pos.x, self.pos.y, self.pos.z
        )
    }
}

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum YardState {
    #[default]
    Disabled,
    Weld,
    Grind,
    Invalid,
    /// Display overlay for the stats menu. Never stored as the underlying state.
    Scanning,
}

impl YardState {
    pub fn is_building(self) -> bool {
        matches!(self, YardState::Weld | YardState::Grind)
    }
}

impl std::fmt::Display for YardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            YardState::Disabled => "disabled",
            YardState::Weld => "weld",
            YardState::Grind => "grind",
            YardState::Invalid => "invalid",
            YardState::Scanning => "scanning",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkMode {
    Weld,
    Grind,
    /// Materialize a virtual block out of its projection.
    BuildProjected,
}

/// Capability tag computed by the host once per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockKind {
    #[default]
    Structural,
    Cargo,
    Tool,
    Reactor,
    GasGenerator,
    GasTank,
    Projector {
        projected: Option<StructureId>,
    },
}

impl BlockKind {
    /// Whether an inventory on this block may feed the yard's tools.
    /// Other tools, reactors and gas equipment are never pulled from.
    pub fn supplies_components(self) -> bool {
        !matches!(
            self,
            BlockKind::Tool | BlockKind::Reactor | BlockKind::GasGenerator | BlockKind::GasTank
        )
    }

    pub fn projected_structure(self) -> Option<StructureId> {
        match self {
            BlockKind::Projector { projected } => projected,
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Host views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsState {
    pub linear_velocity: DVec3,
    pub mass: f64,
    pub center_of_mass: DVec3,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionInfo {
    pub projector: BlockRef,
    pub remaining_blocks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureView {
    pub id: StructureId,
    pub bounds: OrientedBox,
    /// `None` for virtual structures (projections, ghosts).
    pub physics: Option<PhysicsState>,
    pub projection: Option<ProjectionInfo>,
    pub closed: bool,
}

impl StructureView {
    pub fn is_virtual(&self) -> bool {
        self.physics.is_none()
    }

    /// Projection that still has blocks left to build.
    pub fn is_active_projection(&self) -> bool {
        self.projection.is_some_and(|p| p.remaining_blocks > 0)
    }

    /// Open and either physical or an unfinished projection.
    pub fn is_candidate(&self) -> bool {
        !self.closed && (self.physics.is_some() || self.is_active_projection())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockView {
    pub block: BlockRef,
    pub kind: BlockKind,
    pub position: DVec3,
    pub integrity: f32,
    pub max_integrity: f32,
    pub integrity_per_sec: f32,
    /// Full component list of the block definition.
    pub components: ComponentCounts,
    /// Components still needed to finish the block.
    pub missing: ComponentCounts,
    /// Virtual blocks only: can be materialized right now.
    pub buildable: bool,
}

impl BlockView {
    pub fn build_fraction(&self) -> f32 {
        if self.max_integrity <= 0.0 {
            return 1.0;
        }
        (self.integrity / self.max_integrity).clamp(0.0, 1.0)
    }

    pub fn needs_welding(&self) -> bool {
        self.integrity < self.max_integrity || !self.missing.is_empty()
    }

    /// Seconds a single welder needs to take this block from zero to full.
    pub fn build_time_secs(&self) -> f32 {
        if self.integrity_per_sec <= 0.0 {
            return 0.0;
        }
        self.max_integrity / self.integrity_per_sec
    }
}

/// World-wide tool speed settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedMultipliers {
    pub welder: f32,
    pub grinder: f32,
}

impl Default for SpeedMultipliers {
    fn default() -> Self {
        Self {
            welder: 1.0,
            grinder: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Yard registration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSlot {
    pub id: ToolId,
    /// Backing block. A tool without one is powered off.
    pub block: Option<BlockRef>,
    pub position: DVec3,
    pub functional: bool,
}

impl ToolSlot {
    pub fn new(id: ToolId, block: BlockRef, position: DVec3) -> Self {
        Self {
            id,
            block: Some(block),
            position,
            functional: true,
        }
    }

    pub fn is_powered(&self) -> bool {
        self.block.is_some() && self.functional
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YardSpec {
    pub id: YardId,
    pub structure: StructureId,
    pub tools: Vec<ToolSlot>,
    /// Fixed installations never move and pay no stability surcharge.
    pub is_static: bool,
    pub orientation: DQuat,
    /// Explicit volume. `None` derives it from the tool positions; mobile
    /// yards always rederive it every pass.
    #[serde(default)]
    pub volume: Option<OrientedBox>,
}
