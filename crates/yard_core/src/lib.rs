//! `yard_core`: target scheduling and lifecycle for construction yards.
//!
//! No IO, no threads. Structures are reached through `StructureProvider`;
//! everything a pass wants the host to do is returned as an `Effect`.

pub mod allocator;
pub mod catalog;
pub mod classify;
mod config;
mod effects;
pub mod geometry;
pub mod host;
mod memory;
pub mod power;
mod settings;
mod splits;
pub mod status;
mod types;
mod yard;

pub use allocator::{AssignmentTable, BeamSlots, MAX_BEAMS_PER_TOOL};
pub use catalog::{Target, TargetCatalog, TargetStatus};
pub use classify::{Classification, ClassifyDelta, Placement};
pub use config::Tuning;
pub use effects::{Effect, Outbox, WorkOrder};
pub use geometry::{Line, OrientedBox};
pub use host::{Broadcast, NullBroadcast, StructureProvider, ToolControl};
pub use memory::{MemoryStructure, MemoryWorld};
pub use settings::{
    BuildPattern, MemorySettingsStore, SettingsError, SettingsRepository, SettingsStore,
    YardSettings, MAX_MULTIPLIER, MIN_MULTIPLIER,
};
pub use splits::SplitRegistry;
pub use types::*;
pub use yard::{InvalidTools, TickContext, Transition, Yard};

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

#[cfg(test)]
mod tests;
