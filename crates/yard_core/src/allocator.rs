use ahash::AHashSet;

use crate::catalog::TargetCatalog;
use crate::{BlockRef, ToolSlot};

pub const MAX_BEAMS_PER_TOOL: usize = 3;

/// One tool's beams. Only the first `beam_count` entries are ever filled.
pub type BeamSlots = [Option<BlockRef>; MAX_BEAMS_PER_TOOL];

/// Tool slot index → beam slots. A target key appears at most once in the
/// whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentTable {
    slots: Vec<BeamSlots>,
}

impl AssignmentTable {
    pub fn new(tool_count: usize) -> Self {
        Self {
            slots: vec![[None; MAX_BEAMS_PER_TOOL]; tool_count],
        }
    }

    /// Grow or shrink to `tool_count` tools. New tools start empty.
    pub fn resize(&mut self, tool_count: usize) {
        self.slots.resize(tool_count, [None; MAX_BEAMS_PER_TOOL]);
    }

    pub fn tool_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self, tool: usize) -> Option<&BeamSlots> {
        self.slots.get(tool)
    }

    pub fn assigned(&self, tool: usize, beam: usize) -> Option<BlockRef> {
        self.slots.get(tool)?.get(beam).copied().flatten()
    }

    pub fn set(&mut self, tool: usize, beam: usize, target: Option<BlockRef>) {
        if let Some(slot) = self.slots.get_mut(tool).and_then(|s| s.get_mut(beam)) {
            *slot = target;
        }
    }

    /// `(tool, beam, target)` for every occupied slot, in table order.
    pub fn active(&self) -> Vec<(usize, usize, BlockRef)> {
        self.slots
            .iter()
            .enumerate()
            .flat_map(|(tool, beams)| {
                beams
                    .iter()
                    .enumerate()
                    .filter_map(move |(beam, t)| t.map(|key| (tool, beam, key)))
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().filter(|s| s.is_some()).count()
    }

    pub fn active_on(&self, tool: usize) -> usize {
        self.slots
            .get(tool)
            .map_or(0, |beams| beams.iter().filter(|s| s.is_some()).count())
    }

    pub fn contains(&self, key: BlockRef) -> bool {
        self.slots.iter().flatten().any(|s| *s == Some(key))
    }

    pub fn clear_target(&mut self, key: BlockRef) -> bool {
        let mut cleared = false;
        for slot in self.slots.iter_mut().flatten() {
            if *slot == Some(key) {
                *slot = None;
                cleared = true;
            }
        }
        cleared
    }

    pub fn reset_tool(&mut self, tool: usize) {
        if let Some(beams) = self.slots.get_mut(tool) {
            *beams = [None; MAX_BEAMS_PER_TOOL];
        }
    }

    pub fn reset_all(&mut self) {
        for beams in &mut self.slots {
            *beams = [None; MAX_BEAMS_PER_TOOL];
        }
    }

    /// Keep only the slots whose target passes `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(BlockRef) -> bool) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.is_some_and(|key| !keep(key)) {
                *slot = None;
            }
        }
    }

    /// Clear every slot at or beyond `beam_count`.
    pub fn truncate_beams(&mut self, beam_count: usize) {
        for beams in &mut self.slots {
            for slot in beams.iter_mut().skip(beam_count) {
                *slot = None;
            }
        }
    }

    /// Fill empty slots below `beam_count` on every powered tool with the
    /// nearest catalog target that is within reach and not yet assigned.
    /// Returns how many slots were newly filled.
    pub fn fill(
        &mut self,
        catalog: &TargetCatalog,
        tools: &[ToolSlot],
        beam_count: usize,
        max_reach: f64,
    ) -> usize {
        let beam_count = beam_count.min(MAX_BEAMS_PER_TOOL);
        let mut taken: AHashSet<BlockRef> = self.slots.iter().flatten().flatten().copied().collect();
        let mut filled = 0;

        for (tool_index, beams) in self.slots.iter_mut().enumerate() {
            let Some(tool) = tools.get(tool_index) else {
                continue;
            };
            if !tool.is_powered() {
                *beams = [None; MAX_BEAMS_PER_TOOL];
                continue;
            }
            let mut candidates = catalog.proximity(tool_index).iter().copied().filter(|key| {
                catalog
                    .get(*key)
                    .is_some_and(|t| t.distance_from(tool_index) <= max_reach)
            });
            for slot in beams.iter_mut().take(beam_count) {
                if slot.is_some() {
                    continue;
                }
                let Some(key) = candidates.by_ref().find(|key| !taken.contains(key)) else {
                    break;
                };
                taken.insert(key);
                *slot = Some(key);
                filled += 1;
            }
        }
        filled
    }
}
