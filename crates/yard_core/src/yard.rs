//! Yard lifecycle state machine and the per-pass beam cycle.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use glam::{DQuat, DVec3};

use crate::allocator::AssignmentTable;
use crate::catalog::{CatalogScope, TargetCatalog, TargetStatus};
use crate::classify::{Classification, ClassifyDelta};
use crate::config::Tuning;
use crate::effects::{Effect, Outbox, WorkOrder};
use crate::geometry::{clamp_to_sphere, Line, OrientedBox};
use crate::host::StructureProvider;
use crate::power::{tool_power, ToolDraw};
use crate::settings::YardSettings;
use crate::splits::SplitRegistry;
use crate::{
    BlockRef, ComponentCounts, PhysicsState, StructureId, ToolSlot, WorkMode, YardId, YardSpec,
    YardState,
};

/// Power values closer than this are treated as unchanged.
const POWER_EPSILON: f64 = 1e-9;

/// Relative velocities below this are left alone by movement assistance.
const VELOCITY_EPSILON: f64 = 1e-6;

/// Requested lifecycle change, applied at the start of the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter(YardState),
    Disable { broadcast: bool },
    Invalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTools {
    #[error("yard has no tools")]
    NoTools,
    #[error("yard has {0} tools, more than allowed")]
    TooManyTools(usize),
    #[error("no functional tool")]
    NoFunctionalTool,
}

/// Per-pass inputs shared by every yard.
pub struct TickContext<'a> {
    pub provider: &'a dyn StructureProvider,
    pub splits: &'a mut SplitRegistry,
    pub tuning: &'a Tuning,
    pub now: Duration,
    /// Seconds since the previous pass.
    pub dt: f64,
    /// Only the authoritative peer broadcasts state.
    pub authoritative: bool,
}

#[derive(Debug, Clone)]
pub struct Yard {
    id: YardId,
    structure: StructureId,
    tools: Vec<ToolSlot>,
    is_static: bool,
    orientation: DQuat,
    bounds: OrientedBox,
    box_lines: [Line; 12],
    state: YardState,
    scanning: bool,
    pending: VecDeque<Transition>,
    assignments: AssignmentTable,
    contained: BTreeSet<StructureId>,
    intersecting: BTreeSet<StructureId>,
    working: BTreeSet<StructureId>,
    catalog: TargetCatalog,
    cargo: Vec<BlockRef>,
    settings: YardSettings,
    last_power: Vec<Option<f64>>,
}

impl Yard {
    pub fn new(spec: YardSpec, settings: YardSettings, tuning: &Tuning) -> Self {
        let tool_count = spec.tools.len();
        let positions: Vec<DVec3> = spec.tools.iter().map(|t| t.position).collect();
        let bounds = spec
            .volume
            .or_else(|| OrientedBox::enclosing(&positions, spec.orientation, tuning.box_padding_m))
            .unwrap_or_else(|| OrientedBox::new(DVec3::ZERO, DVec3::ZERO, spec.orientation));
        Self {
            id: spec.id,
            structure: spec.structure,
            tools: spec.tools,
            is_static: spec.is_static,
            orientation: spec.orientation,
            bounds,
            box_lines: bounds.edges(),
            state: YardState::Disabled,
            scanning: false,
            pending: VecDeque::new(),
            assignments: AssignmentTable::new(tool_count),
            contained: BTreeSet::new(),
            intersecting: BTreeSet::new(),
            working: BTreeSet::new(),
            catalog: TargetCatalog::new(),
            cargo: Vec::new(),
            settings,
            last_power: vec![None; tool_count],
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> YardId {
        self.id
    }

    pub fn structure(&self) -> StructureId {
        self.structure
    }

    /// Underlying lifecycle state. Never `Scanning`.
    pub fn state(&self) -> YardState {
        self.state
    }

    /// State as shown to players: `Scanning` while the overlay is up.
    pub fn display_state(&self) -> YardState {
        if self.scanning {
            YardState::Scanning
        } else {
            self.state
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_mobile(&self) -> bool {
        !self.is_static
    }

    pub fn tools(&self) -> &[ToolSlot] {
        &self.tools
    }

    pub fn bounds(&self) -> &OrientedBox {
        &self.bounds
    }

    pub fn box_lines(&self) -> &[Line; 12] {
        &self.box_lines
    }

    pub fn assignments(&self) -> &AssignmentTable {
        &self.assignments
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    pub fn contained(&self) -> &BTreeSet<StructureId> {
        &self.contained
    }

    pub fn intersecting(&self) -> &BTreeSet<StructureId> {
        &self.intersecting
    }

    pub fn working(&self) -> &BTreeSet<StructureId> {
        &self.working
    }

    pub fn cargo(&self) -> &[BlockRef] {
        &self.cargo
    }

    pub fn settings(&self) -> &YardSettings {
        &self.settings
    }

    pub fn missing_components(&self) -> &ComponentCounts {
        self.catalog.missing_components()
    }

    pub fn last_power(&self, tool: usize) -> Option<f64> {
        self.last_power.get(tool).copied().flatten()
    }

    /// Drop the record of what the host was last told, so the next tick
    /// reports every tool's power again.
    pub fn forget_reported_power(&mut self) {
        self.last_power.fill(None);
    }

    pub fn pending_transitions(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------------
    // Inputs from the session
    // -----------------------------------------------------------------------

    /// Queue a transition for the next pass.
    pub fn request(&mut self, transition: Transition) {
        tracing::debug!(yard = %self.id, ?transition, "transition queued");
        self.pending.push_back(transition);
    }

    pub fn set_settings(&mut self, settings: YardSettings) {
        self.settings = settings;
    }

    pub fn set_cargo(&mut self, cargo: Vec<BlockRef>) {
        self.cargo = cargo;
    }

    pub fn validate_tools(&self, max_tools: usize) -> Result<(), InvalidTools> {
        if self.tools.is_empty() {
            return Err(InvalidTools::NoTools);
        }
        if self.tools.len() > max_tools {
            return Err(InvalidTools::TooManyTools(self.tools.len()));
        }
        if !self.tools.iter().any(ToolSlot::is_powered) {
            return Err(InvalidTools::NoFunctionalTool);
        }
        Ok(())
    }

    /// Pull tool positions and backing-block state from the world. A tool
    /// whose block has vanished is powered off until it reappears.
    pub fn refresh_tools(&mut self, provider: &dyn StructureProvider) {
        for tool in &mut self.tools {
            match tool.block.and_then(|b| provider.block(b)) {
                Some(block) => {
                    tool.position = block.position;
                    tool.functional = block.integrity > 0.0;
                }
                None => tool.functional = false,
            }
        }
    }

    /// Store a fresh classification. While building, working structures that
    /// no longer touch the yard box are dropped along with their split
    /// registrations.
    pub fn apply_classification(
        &mut self,
        classification: Classification,
        splits: &mut SplitRegistry,
    ) -> ClassifyDelta {
        let previous = Classification {
            contained: std::mem::take(&mut self.contained),
            intersecting: std::mem::take(&mut self.intersecting),
        };
        let delta = classification.delta_from(&previous);

        if self.state.is_building() {
            let dropped: Vec<StructureId> = self
                .working
                .iter()
                .copied()
                .filter(|id| !classification.touches(*id))
                .collect();
            for id in dropped {
                tracing::debug!(yard = %self.id, structure = %id, "structure left the yard");
                self.drop_working(id, splits);
            }
        }

        self.contained = classification.contained;
        self.intersecting = classification.intersecting;
        delta
    }

    /// A tracked structure split. The fragment joins the working set and is
    /// tracked in turn; whether it stays is decided by the next detection.
    pub fn notify_split(
        &mut self,
        old: StructureId,
        new: StructureId,
        splits: &mut SplitRegistry,
    ) -> bool {
        if !self.state.is_building() || !self.working.contains(&old) {
            return false;
        }
        if self.working.insert(new) {
            splits.subscribe(new, self.id);
            self.catalog.request_refresh();
            tracing::debug!(yard = %self.id, %old, %new, "split fragment tracked");
        }
        true
    }

    /// Remove a structure the world closed or removed.
    pub fn forget_structure(&mut self, id: StructureId, splits: &mut SplitRegistry) {
        self.contained.remove(&id);
        self.intersecting.remove(&id);
        if self.working.contains(&id) {
            self.drop_working(id, splits);
        }
    }

    fn drop_working(&mut self, id: StructureId, splits: &mut SplitRegistry) {
        self.working.remove(&id);
        splits.unsubscribe(id, self.id);
        let orphaned: Vec<BlockRef> = self
            .catalog
            .iter()
            .filter(|t| t.origin == id || t.key.structure == id)
            .map(|t| t.key)
            .collect();
        for key in orphaned {
            self.catalog.retire(key);
            self.assignments.clear_target(key);
        }
    }

    // -----------------------------------------------------------------------
    // Per-pass cycle
    // -----------------------------------------------------------------------

    pub fn tick(&mut self, ctx: &mut TickContext<'_>, out: &mut Outbox) {
        self.apply_transitions(ctx, out);

        if self.state == YardState::Invalid {
            self.update_power(ctx.tuning, 0.0, out);
            return;
        }

        let mut locking_cost = 0.0;
        if self.is_mobile() {
            self.refresh_bounds(ctx.tuning);
            locking_cost = self.assist_movement(ctx, out);
        }

        if self.state.is_building() {
            self.run_beams(ctx, out);
        }

        self.update_power(ctx.tuning, locking_cost, out);
    }

    fn apply_transitions(&mut self, ctx: &mut TickContext<'_>, out: &mut Outbox) {
        while let Some(transition) = self.pending.pop_front() {
            match transition {
                Transition::Enter(YardState::Scanning) => self.scanning = true,
                Transition::Enter(YardState::Disabled) => {
                    self.scanning = false;
                    self.disable(true, ctx, out);
                }
                Transition::Enter(YardState::Invalid) | Transition::Invalidate => {
                    self.scanning = false;
                    self.invalidate(ctx, out);
                }
                Transition::Enter(target) => {
                    self.scanning = false;
                    self.init(target, ctx, out);
                }
                Transition::Disable { broadcast } => {
                    self.scanning = false;
                    self.disable(broadcast, ctx, out);
                }
            }
        }
    }

    /// Switching between Weld and Grind keeps the working set as it is; only
    /// entering a building state from Disabled snapshots contained structures.
    fn init(&mut self, target: YardState, ctx: &mut TickContext<'_>, out: &mut Outbox) {
        if target == self.state {
            return;
        }
        if self.state == YardState::Invalid {
            tracing::warn!(yard = %self.id, requested = %target, "ignoring transition on invalid yard");
            return;
        }

        if self.state.is_building() {
            // Weld <-> Grind: same structures, new targets.
            self.assignments.reset_all();
            self.catalog.clear();
        } else {
            for id in std::mem::take(&mut self.contained) {
                let open = ctx.provider.structure(id).is_some_and(|s| !s.closed);
                if open {
                    splits_subscribe(ctx.splits, id, self.id);
                    self.working.insert(id);
                }
            }
            self.intersecting.clear();
            for tool in &self.tools {
                out.push(Effect::EnableTool { tool: tool.id });
            }
        }

        tracing::debug!(yard = %self.id, from = %self.state, to = %target, working = self.working.len(), "yard init");
        self.state = target;
        self.catalog.request_refresh();
        if ctx.authoritative {
            out.push(Effect::YardState {
                yard: self.id,
                state: target,
            });
        }
    }

    fn disable(&mut self, broadcast: bool, ctx: &mut TickContext<'_>, out: &mut Outbox) {
        if self.state == YardState::Invalid {
            self.reset_power_floor(ctx.tuning, out);
        }
        self.cleanup(ctx.splits);
        tracing::debug!(yard = %self.id, from = %self.state, broadcast, "yard disabled");
        self.state = YardState::Disabled;
        if broadcast && ctx.authoritative {
            out.push(Effect::YardState {
                yard: self.id,
                state: YardState::Disabled,
            });
        }
    }

    fn invalidate(&mut self, ctx: &mut TickContext<'_>, out: &mut Outbox) {
        if self.state == YardState::Invalid {
            return;
        }
        self.cleanup(ctx.splits);
        self.reset_power_floor(ctx.tuning, out);
        tracing::debug!(yard = %self.id, from = %self.state, "yard invalidated");
        self.state = YardState::Invalid;
        if ctx.authoritative {
            out.push(Effect::YardState {
                yard: self.id,
                state: YardState::Invalid,
            });
        }
    }

    fn cleanup(&mut self, splits: &mut SplitRegistry) {
        splits.unsubscribe_yard(self.id);
        self.working.clear();
        self.contained.clear();
        self.intersecting.clear();
        self.catalog.clear();
        self.assignments.reset_all();
    }

    fn reset_power_floor(&mut self, tuning: &Tuning, out: &mut Outbox) {
        for (tool, last) in self.tools.iter().zip(self.last_power.iter_mut()) {
            out.push(Effect::ToolPowerFloor {
                tool: tool.id,
                power: tuning.idle_power,
            });
            *last = Some(tuning.idle_power);
        }
    }

    fn refresh_bounds(&mut self, tuning: &Tuning) {
        let orientation = self.orientation;
        let positions: Vec<DVec3> = self.tools.iter().map(|t| t.position).collect();
        if let Some(bounds) = OrientedBox::enclosing(&positions, orientation, tuning.box_padding_m) {
            self.bounds = bounds;
            self.box_lines = bounds.edges();
        }
    }

    /// Match the velocity of structures in the yard to the yard's own.
    /// Returns the locking power spent this pass.
    fn assist_movement(&self, ctx: &TickContext<'_>, out: &mut Outbox) -> f64 {
        let Some(yard_physics) = ctx.provider.structure(self.structure).and_then(|s| s.physics)
        else {
            return 0.0;
        };
        let yard_velocity = yard_physics.linear_velocity;
        let tuning = ctx.tuning;
        let mut cost = 0.0;

        let nudge = |id: StructureId, physics: &PhysicsState| -> Option<Effect> {
            let delta = yard_velocity - physics.linear_velocity;
            if delta.length() < VELOCITY_EPSILON {
                return None;
            }
            Some(Effect::Impulse {
                structure: id,
                impulse: clamp_to_sphere(delta, tuning.nudge_clamp) * physics.mass,
                at: physics.center_of_mass,
            })
        };

        for (id, physics) in self.moving(ctx.provider, &self.contained) {
            out.extend(nudge(id, &physics));
        }

        for (id, physics) in self.moving(ctx.provider, &self.working) {
            if !self.settings.advanced_locking {
                out.extend(nudge(id, &physics));
                continue;
            }
            let delta = yard_velocity - physics.linear_velocity;
            if delta.length() < VELOCITY_EPSILON {
                continue;
            }
            let impulse = delta * physics.mass;
            cost += impulse.length() * tuning.locking_power_per_impulse;
            out.push(Effect::Impulse {
                structure: id,
                impulse,
                at: physics.center_of_mass,
            });
        }
        cost
    }

    fn moving(
        &self,
        provider: &dyn StructureProvider,
        set: &BTreeSet<StructureId>,
    ) -> Vec<(StructureId, PhysicsState)> {
        set.iter()
            .filter(|id| **id != self.structure)
            .filter_map(|id| provider.structure(*id))
            .filter(|s| !s.closed)
            .filter_map(|s| s.physics.filter(|p| !p.is_static).map(|p| (s.id, p)))
            .collect()
    }

    fn work_mode(&self) -> WorkMode {
        if self.state == YardState::Grind {
            WorkMode::Grind
        } else {
            WorkMode::Weld
        }
    }

    fn multiplier(&self) -> f32 {
        if self.state == YardState::Grind {
            self.settings.grind_multiplier
        } else {
            self.settings.weld_multiplier
        }
    }

    fn run_beams(&mut self, ctx: &mut TickContext<'_>, out: &mut Outbox) {
        let mode = self.work_mode();
        let beam_count = self.settings.beams();
        let scope = CatalogScope {
            mode,
            yard_box: &self.bounds,
            tools: &self.tools,
            working: &self.working,
            pattern: self.settings.build_pattern,
            cargo: &self.cargo,
            max_reach: ctx.tuning.max_beam_reach_m,
        };

        for (tool_index, beam, key) in self.assignments.active() {
            let tool = &self.tools[tool_index];
            match self.catalog.assess(ctx.provider, key, tool, tool_index, &scope) {
                TargetStatus::Active => {}
                TargetStatus::Complete | TargetStatus::Gone => {
                    self.catalog.retire(key);
                    self.assignments.clear_target(key);
                }
                TargetStatus::Unreachable => self.assignments.set(tool_index, beam, None),
            }
        }

        if self.catalog.is_due(ctx.now, ctx.tuning.catalog_refresh()) {
            self.catalog.refresh(ctx.provider, &scope, ctx.now);
            tracing::debug!(yard = %self.id, targets = self.catalog.len(), "catalog refreshed");
        }
        let catalog = &self.catalog;
        self.assignments.retain(|key| catalog.contains(key));
        self.assignments.truncate_beams(beam_count);
        self.assignments
            .fill(&self.catalog, &self.tools, beam_count, ctx.tuning.max_beam_reach_m);

        if ctx.dt <= 0.0 {
            return;
        }
        let speed = ctx.provider.speed_multipliers();
        let world_speed = if mode == WorkMode::Grind {
            speed.grinder
        } else {
            speed.welder
        };
        #[allow(clippy::cast_possible_truncation)]
        let dt = ctx.dt as f32;
        for (tool_index, beam, key) in self.assignments.active() {
            let Some(target) = self.catalog.get(key) else {
                continue;
            };
            let amount = target.integrity_per_sec * self.multiplier() * world_speed * dt;
            let order_mode = if target.is_virtual() {
                WorkMode::BuildProjected
            } else {
                mode
            };
            out.push(Effect::Work(WorkOrder {
                tool: self.tools[tool_index].id,
                beam,
                target: key,
                mode: order_mode,
                amount,
            }));
            self.catalog.record_work(key, amount);
        }
    }

    fn update_power(&mut self, tuning: &Tuning, locking_cost: f64, out: &mut Outbox) {
        // Shared across however many tools the yard has, not a fixed eight.
        let locking_share = if self.tools.is_empty() {
            0.0
        } else {
            locking_cost / self.tools.len() as f64
        };
        let multiplier = f64::from(self.multiplier());
        let mobile = self.is_mobile();

        for (index, tool) in self.tools.iter().enumerate() {
            let distances: Vec<f64> = self
                .assignments
                .slots(index)
                .into_iter()
                .flatten()
                .flatten()
                .filter_map(|key| self.catalog.get(*key))
                .map(|t| t.distance_from(index))
                .collect();
            let power = tool_power(
                &ToolDraw {
                    state: self.state,
                    powered: tool.is_powered(),
                    mobile,
                    beam_distances: &distances,
                    multiplier,
                    locking_share,
                },
                tuning,
            );
            let changed = self
                .last_power
                .get(index)
                .copied()
                .flatten()
                .is_none_or(|last| (last - power).abs() > POWER_EPSILON);
            if changed {
                if let Some(slot) = self.last_power.get_mut(index) {
                    *slot = Some(power);
                }
                out.push(Effect::ToolPower {
                    tool: tool.id,
                    power,
                });
            }
        }
    }
}

fn splits_subscribe(splits: &mut SplitRegistry, structure: StructureId, yard: YardId) {
    if !splits.subscribe(structure, yard) {
        tracing::debug!(%structure, %yard, "split tracking already registered");
    }
}
