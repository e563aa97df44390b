//! Target catalog: the blocks a building yard may put beams on, with their
//! accumulated progress and per-tool proximity ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use glam::DVec3;
use smallvec::SmallVec;

use crate::geometry::OrientedBox;
use crate::host::StructureProvider;
use crate::settings::BuildPattern;
use crate::{
    BlockRef, BlockView, ComponentCounts, StructureId, StructureView, ToolSlot, WorkMode,
};

/// Distance table entry for a tool that cannot fire.
const UNREACHABLE: f64 = f64::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Active,
    /// Work on the block is done.
    Complete,
    /// Block, structure or working-set membership vanished, or a projected
    /// block stopped being buildable. Refresh brings it back if that changes.
    Gone,
    /// Still valid but cannot be worked from this tool right now.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub key: BlockRef,
    /// Projector owning the virtual block, `None` for physical blocks.
    pub projector: Option<BlockRef>,
    /// Working structure the target was found through.
    pub origin: StructureId,
    pub position: DVec3,
    /// Indexed by tool slot.
    pub tool_distances: SmallVec<[f64; 8]>,
    /// Build-pattern priority for virtual blocks.
    pub pattern_distance: Option<f64>,
    pub integrity_per_sec: f32,
    pub progress: f32,
    /// Seconds for one beam at multiplier 1 to build the block from scratch.
    pub build_time: f32,
    /// Seconds of single-beam work left in the current mode.
    pub remaining_time: f32,
}

impl Target {
    pub fn is_virtual(&self) -> bool {
        self.projector.is_some()
    }

    pub fn distance_from(&self, tool: usize) -> f64 {
        self.tool_distances.get(tool).copied().unwrap_or(UNREACHABLE)
    }

    /// Ordering key within a tool's proximity list.
    fn priority(&self, tool: usize) -> f64 {
        match self.pattern_distance {
            Some(d) if self.is_virtual() => d,
            _ => self.distance_from(tool),
        }
    }
}

/// Everything a refresh needs from the yard.
#[derive(Debug, Clone, Copy)]
pub struct CatalogScope<'a> {
    pub mode: WorkMode,
    pub yard_box: &'a OrientedBox,
    pub tools: &'a [ToolSlot],
    pub working: &'a BTreeSet<StructureId>,
    pub pattern: BuildPattern,
    /// Connected cargo inventories, used for the missing-components estimate.
    pub cargo: &'a [BlockRef],
    pub max_reach: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    targets: BTreeMap<BlockRef, Target>,
    proximity: Vec<Vec<BlockRef>>,
    missing: ComponentCounts,
    last_refresh: Option<Duration>,
    force_refresh: bool,
}

impl TargetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, key: BlockRef) -> Option<&Target> {
        self.targets.get(&key)
    }

    pub fn contains(&self, key: BlockRef) -> bool {
        self.targets.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Nearest-first target keys for one tool slot.
    pub fn proximity(&self, tool: usize) -> &[BlockRef] {
        self.proximity.get(tool).map_or(&[], Vec::as_slice)
    }

    /// Components the weld targets still need beyond what connected cargo holds.
    pub fn missing_components(&self) -> &ComponentCounts {
        &self.missing
    }

    pub fn request_refresh(&mut self) {
        self.force_refresh = true;
    }

    pub fn is_due(&self, now: Duration, interval: Duration) -> bool {
        self.force_refresh
            || self
                .last_refresh
                .is_none_or(|last| now.saturating_sub(last) >= interval)
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.proximity.clear();
        self.missing.clear();
        self.last_refresh = None;
        self.force_refresh = false;
    }

    pub fn retire(&mut self, key: BlockRef) -> Option<Target> {
        let removed = self.targets.remove(&key)?;
        for list in &mut self.proximity {
            list.retain(|k| *k != key);
        }
        Some(removed)
    }

    pub fn record_work(&mut self, key: BlockRef, amount: f32) {
        if let Some(target) = self.targets.get_mut(&key) {
            target.progress += amount;
        }
    }

    /// Check an assigned target against the live world and refresh its
    /// distance from `tool`.
    pub fn assess(
        &mut self,
        provider: &dyn StructureProvider,
        key: BlockRef,
        tool: &ToolSlot,
        tool_index: usize,
        scope: &CatalogScope<'_>,
    ) -> TargetStatus {
        let Some(target) = self.targets.get_mut(&key) else {
            return TargetStatus::Gone;
        };
        if !scope.working.contains(&target.origin) {
            return TargetStatus::Gone;
        }
        let open = provider
            .structure(key.structure)
            .is_some_and(|s| !s.closed);
        if !open {
            return TargetStatus::Gone;
        }
        let Some(block) = provider.block(key) else {
            return TargetStatus::Gone;
        };

        let distance = block.position.distance(tool.position);
        if let Some(slot) = target.tool_distances.get_mut(tool_index) {
            *slot = if tool.is_powered() { distance } else { UNREACHABLE };
        }
        target.position = block.position;

        let status = match scope.mode {
            WorkMode::Grind if block.integrity <= 0.0 => TargetStatus::Complete,
            WorkMode::Weld if target.projector.is_none() && !block.needs_welding() => {
                TargetStatus::Complete
            }
            WorkMode::Weld | WorkMode::BuildProjected
                if target.projector.is_some() && !block.buildable =>
            {
                TargetStatus::Gone
            }
            _ => TargetStatus::Active,
        };
        if status == TargetStatus::Active && (!tool.is_powered() || distance > scope.max_reach) {
            return TargetStatus::Unreachable;
        }
        status
    }

    /// Rebuild the catalog from the working set. Targets that are still
    /// candidates keep their progress; everything else is dropped.
    pub fn refresh(
        &mut self,
        provider: &dyn StructureProvider,
        scope: &CatalogScope<'_>,
        now: Duration,
    ) {
        let mut found: BTreeMap<BlockRef, Target> = BTreeMap::new();
        for candidate in collect_candidates(provider, scope) {
            let Some(target) = self.build_target(provider, scope, candidate) else {
                continue;
            };
            found.insert(target.key, target);
        }
        self.targets = found;
        self.rebuild_proximity(scope.tools.len());
        self.missing = if scope.mode == WorkMode::Grind {
            ComponentCounts::new()
        } else {
            self.compute_missing(provider, scope.cargo)
        };
        self.last_refresh = Some(now);
        self.force_refresh = false;
    }

    fn build_target(
        &self,
        provider: &dyn StructureProvider,
        scope: &CatalogScope<'_>,
        candidate: Candidate,
    ) -> Option<Target> {
        let Candidate {
            block,
            origin,
            projection,
        } = candidate;

        let tool_distances: SmallVec<[f64; 8]> = scope
            .tools
            .iter()
            .map(|tool| {
                if tool.is_powered() {
                    block.position.distance(tool.position)
                } else {
                    UNREACHABLE
                }
            })
            .collect();
        let nearest = tool_distances.iter().copied().fold(UNREACHABLE, f64::min);
        if nearest > scope.max_reach {
            return None;
        }

        let projector = projection.as_ref().and_then(|p| p.projection).map(|p| p.projector);
        let pattern_distance = projection
            .as_ref()
            .and_then(|view| pattern_distance(provider, scope.pattern, view, block.position));

        let build_time = block.build_time_secs();
        let remaining_time = if projector.is_some() {
            build_time
        } else if scope.mode == WorkMode::Grind {
            build_time * block.build_fraction()
        } else {
            build_time * (1.0 - block.build_fraction())
        };
        let progress = self
            .targets
            .get(&block.block)
            .map_or(0.0, |existing| existing.progress);

        Some(Target {
            key: block.block,
            projector,
            origin,
            position: block.position,
            tool_distances,
            pattern_distance,
            integrity_per_sec: block.integrity_per_sec,
            progress,
            build_time,
            remaining_time,
        })
    }

    fn rebuild_proximity(&mut self, tool_count: usize) {
        self.proximity = (0..tool_count)
            .map(|tool| {
                let mut ranked: Vec<&Target> = self
                    .targets
                    .values()
                    .filter(|t| t.distance_from(tool).is_finite())
                    .collect();
                ranked.sort_by(|a, b| {
                    a.priority(tool)
                        .total_cmp(&b.priority(tool))
                        .then(a.key.cmp(&b.key))
                });
                ranked.into_iter().map(|t| t.key).collect()
            })
            .collect();
    }

    fn compute_missing(
        &self,
        provider: &dyn StructureProvider,
        cargo: &[BlockRef],
    ) -> ComponentCounts {
        let mut needed = ComponentCounts::new();
        for target in self.targets.values() {
            let Some(block) = provider.block(target.key) else {
                continue;
            };
            let list = if target.is_virtual() {
                &block.components
            } else {
                &block.missing
            };
            for (name, count) in list {
                *needed.entry(name.clone()).or_default() += count;
            }
        }
        for inventory in cargo.iter().filter_map(|c| provider.inventory(*c)) {
            for (name, available) in inventory {
                if let Some(count) = needed.get_mut(&name) {
                    *count = count.saturating_sub(available);
                }
            }
        }
        needed.retain(|_, count| *count > 0);
        needed
    }
}

struct Candidate {
    block: BlockView,
    origin: StructureId,
    /// View of the projection the block belongs to, for virtual blocks.
    projection: Option<StructureView>,
}

fn collect_candidates(provider: &dyn StructureProvider, scope: &CatalogScope<'_>) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for &origin in scope.working {
        let Some(view) = provider.structure(origin) else {
            continue;
        };
        if view.closed {
            continue;
        }
        if view.is_virtual() {
            if scope.mode == WorkMode::Weld && view.is_active_projection() {
                push_projected(provider, scope, origin, &view, &mut candidates);
            }
            continue;
        }

        let blocks = provider.blocks(origin);
        for block in &blocks {
            if !scope.yard_box.contains_point(block.position) {
                continue;
            }
            let wanted = match scope.mode {
                WorkMode::Grind => true,
                WorkMode::Weld | WorkMode::BuildProjected => block.needs_welding(),
            };
            if wanted {
                candidates.push(Candidate {
                    block: block.clone(),
                    origin,
                    projection: None,
                });
            }
        }

        if scope.mode != WorkMode::Weld {
            continue;
        }
        let projected: BTreeSet<StructureId> = blocks
            .iter()
            .filter_map(|b| b.kind.projected_structure())
            .filter(|p| !scope.working.contains(p))
            .collect();
        for projection in projected {
            let Some(projection_view) = provider.structure(projection) else {
                continue;
            };
            if projection_view.closed || !projection_view.is_active_projection() {
                continue;
            }
            push_projected(provider, scope, origin, &projection_view, &mut candidates);
        }
    }
    candidates
}

fn push_projected(
    provider: &dyn StructureProvider,
    scope: &CatalogScope<'_>,
    origin: StructureId,
    projection: &StructureView,
    candidates: &mut Vec<Candidate>,
) {
    for block in provider.blocks(projection.id) {
        if block.buildable && scope.yard_box.contains_point(block.position) {
            candidates.push(Candidate {
                block,
                origin,
                projection: Some(projection.clone()),
            });
        }
    }
}

fn pattern_distance(
    provider: &dyn StructureProvider,
    pattern: BuildPattern,
    projection: &StructureView,
    position: DVec3,
) -> Option<f64> {
    match pattern {
        BuildPattern::FromProjector => {
            let projector = projection.projection?.projector;
            provider
                .block(projector)
                .map(|b| b.position.distance(position))
        }
        BuildPattern::FromCenter => Some(projection.bounds.center.distance(position)),
        BuildPattern::FromCorners => None,
    }
}
