//! Sandbox host, scenario loading and persistence shared by yard_cli and the
//! integration tests.

mod broadcast;
mod generate;
mod sandbox;
mod scenario;
mod settings_store;

use std::path::Path;

use anyhow::{Context, Result};
use yard_runtime::SessionConfig;

pub use broadcast::{BroadcastEvent, RecordingBroadcast};
pub use generate::{generate_scrapyard, SCRAPYARD_HALF_EXTENT, SCRAPYARD_YARD};
pub use sandbox::{SandboxTools, SandboxWorld, ToolReading};
pub use scenario::{
    load_scenario, BlockDef, InitialCommand, InventoryDef, Scenario, StructureDef,
};
pub use settings_store::{JsonSettingsStore, SettingsEntry};

/// Read a session config. Fields the file leaves out take their defaults.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let name = path.display();
    let config: SessionConfig = serde_json::from_str(
        &std::fs::read_to_string(path).with_context(|| format!("reading {name}"))?,
    )
    .with_context(|| format!("parsing {name}"))?;
    tracing::info!(
        config = %name,
        authoritative = config.authoritative,
        diagnostic = config.diagnostic,
        "session config loaded"
    );
    Ok(config)
}
