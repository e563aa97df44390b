//! Lookup tables published by the pipeline for readers on other threads.

use ahash::AHashMap;
use parking_lot::RwLock;
use yard_core::{BlockRef, ToolId, Yard, YardId, YardState};

#[derive(Debug, Default)]
struct Tables {
    by_tool: AHashMap<ToolId, YardId>,
    by_block: AHashMap<BlockRef, YardId>,
    states: AHashMap<YardId, YardState>,
}

/// Tool → yard and yard → state, as of the last pass that published them.
#[derive(Debug, Default)]
pub struct YardDirectory {
    tables: RwLock<Tables>,
}

impl YardDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn yard_for_tool(&self, tool: ToolId) -> Option<YardId> {
        self.tables.read().by_tool.get(&tool).copied()
    }

    pub fn yard_for_block(&self, block: BlockRef) -> Option<YardId> {
        self.tables.read().by_block.get(&block).copied()
    }

    /// Displayed state, so `Scanning` shows while the overlay is up.
    pub fn yard_state(&self, yard: YardId) -> Option<YardState> {
        self.tables.read().states.get(&yard).copied()
    }

    pub fn yard_count(&self) -> usize {
        self.tables.read().states.len()
    }

    pub fn publish_states<'a>(&self, yards: impl IntoIterator<Item = &'a Yard>) {
        let states = yards
            .into_iter()
            .map(|y| (y.id(), y.display_state()))
            .collect();
        self.tables.write().states = states;
    }

    pub fn publish_tools<'a>(&self, yards: impl IntoIterator<Item = &'a Yard>) {
        let mut by_tool = AHashMap::new();
        let mut by_block = AHashMap::new();
        for yard in yards {
            for tool in yard.tools() {
                by_tool.insert(tool.id, yard.id());
                if let Some(block) = tool.block {
                    by_block.insert(block, yard.id());
                }
            }
        }
        let mut tables = self.tables.write();
        tables.by_tool = by_tool;
        tables.by_block = by_block;
    }

    pub fn forget(&self, yard: YardId) {
        let mut tables = self.tables.write();
        tables.states.remove(&yard);
        tables.by_tool.retain(|_, y| *y != yard);
        tables.by_block.retain(|_, y| *y != yard);
    }
}
