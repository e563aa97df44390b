//! Background grind/weld estimates for the stats menu.
//!
//! The first poll snapshots the yard, starts a one-shot scan on the rayon
//! pool and returns the placeholder. The result is withheld until the
//! minimum display time has passed since the scan started, and after that
//! the same string is returned until the entry is cleared.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use glam::DVec3;
use parking_lot::Mutex;
use yard_core::status::format_estimate;
use yard_core::{
    BlockView, ComponentCounts, StructureId, StructureProvider, Tuning, Yard, YardId,
};

use crate::pipeline::panic_message;

pub const SCAN_PLACEHOLDER: &str = "SCANNING...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    Grind,
    Weld,
}

/// What a scan needs from a yard, copied so the scan can run off-thread.
#[derive(Debug, Clone, PartialEq)]
pub struct YardSnapshot {
    pub yard: YardId,
    /// Working and contained structures.
    pub structures: BTreeSet<StructureId>,
    pub working: usize,
    pub beam_count: usize,
    pub tool_count: usize,
    pub weld_multiplier: f32,
    pub grind_multiplier: f32,
    pub half_extents: DVec3,
}

impl YardSnapshot {
    pub fn of(yard: &Yard) -> Self {
        let settings = yard.settings();
        Self {
            yard: yard.id(),
            structures: yard.working().union(yard.contained()).copied().collect(),
            working: yard.working().len(),
            beam_count: settings.beams(),
            tool_count: yard.tools().len(),
            weld_multiplier: settings.weld_multiplier,
            grind_multiplier: settings.grind_multiplier,
            half_extents: yard.bounds().half_extents,
        }
    }
}

#[derive(Debug)]
struct StatEntry {
    kind: StatsKind,
    started: Duration,
    generation: u64,
    output: Option<String>,
}

#[derive(Debug, Default)]
struct Cache {
    entries: AHashMap<YardId, StatEntry>,
    next_generation: u64,
}

pub struct StatsScanner {
    provider: Arc<dyn StructureProvider>,
    tuning: Tuning,
    cache: Arc<Mutex<Cache>>,
}

impl std::fmt::Debug for StatsScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsScanner")
            .field("cache", &*self.cache.lock())
            .finish_non_exhaustive()
    }
}

impl StatsScanner {
    pub fn new(provider: Arc<dyn StructureProvider>, tuning: Tuning) -> Self {
        Self {
            provider,
            tuning,
            cache: Arc::new(Mutex::new(Cache::default())),
        }
    }

    pub fn format_grind_stats(&self, yard: &Yard, now: Duration) -> String {
        self.poll(StatsKind::Grind, yard, now)
    }

    pub fn format_weld_stats(&self, yard: &Yard, now: Duration) -> String {
        self.poll(StatsKind::Weld, yard, now)
    }

    /// Cached output once it exists and has been up long enough, the
    /// placeholder otherwise. Asking for a different kind restarts the scan.
    pub fn poll(&self, kind: StatsKind, yard: &Yard, now: Duration) -> String {
        let id = yard.id();
        let generation = {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.entries.get(&id).filter(|e| e.kind == kind) {
                let shown_for = now.saturating_sub(entry.started);
                return match &entry.output {
                    Some(output) if shown_for >= self.tuning.stats_min_display() => output.clone(),
                    _ => SCAN_PLACEHOLDER.to_string(),
                };
            }
            let generation = cache.next_generation;
            cache.next_generation += 1;
            cache.entries.insert(
                id,
                StatEntry {
                    kind,
                    started: now,
                    generation,
                    output: None,
                },
            );
            generation
        };

        tracing::debug!(yard = %id, ?kind, "stats scan started");
        let snapshot = YardSnapshot::of(yard);
        let provider = Arc::clone(&self.provider);
        let tuning = self.tuning.clone();
        let cache = Arc::clone(&self.cache);
        rayon::spawn(move || {
            let scanned = panic::catch_unwind(AssertUnwindSafe(|| {
                scan(kind, &snapshot, provider.as_ref(), &tuning)
            }));
            let mut cache = cache.lock();
            let current = cache
                .entries
                .get(&snapshot.yard)
                .is_some_and(|e| e.generation == generation);
            if !current {
                return;
            }
            match scanned {
                Ok(output) => {
                    if let Some(entry) = cache.entries.get_mut(&snapshot.yard) {
                        entry.output = Some(output);
                    }
                }
                Err(payload) => {
                    tracing::error!(
                        yard = %snapshot.yard,
                        message = %panic_message(payload.as_ref()),
                        "stats scan panicked"
                    );
                    cache.entries.remove(&snapshot.yard);
                }
            }
        });
        SCAN_PLACEHOLDER.to_string()
    }

    /// Forget the cached result so the next poll scans again.
    pub fn clear(&self, yard: YardId) {
        self.cache.lock().entries.remove(&yard);
    }

    /// Whether the scan for `yard` has produced output, shown or not.
    pub fn scan_finished(&self, yard: YardId) -> bool {
        self.cache
            .lock()
            .entries
            .get(&yard)
            .is_some_and(|e| e.output.is_some())
    }
}

#[derive(Debug, Default)]
struct ScanTotals {
    block_count: usize,
    seconds: f32,
    components: ComponentCounts,
}

/// Run a scan synchronously and render its text.
pub fn scan(
    kind: StatsKind,
    snapshot: &YardSnapshot,
    provider: &dyn StructureProvider,
    tuning: &Tuning,
) -> String {
    let totals = match kind {
        StatsKind::Grind => grind_totals(snapshot, provider, tuning),
        StatsKind::Weld => weld_totals(snapshot, provider, tuning),
    };
    render(kind, snapshot, &totals, tuning)
}

fn block_secs(work: f32, block: &BlockView, speed: f32, multiplier: f32, floor: f32) -> f32 {
    if block.integrity_per_sec <= 0.0 || speed <= 0.0 || multiplier <= 0.0 {
        return floor;
    }
    (work * block.max_integrity / block.integrity_per_sec / speed / multiplier).max(floor)
}

fn add_components(into: &mut ComponentCounts, from: &ComponentCounts) {
    for (name, count) in from {
        *into.entry(name.clone()).or_default() += count;
    }
}

fn grind_totals(
    snapshot: &YardSnapshot,
    provider: &dyn StructureProvider,
    tuning: &Tuning,
) -> ScanTotals {
    let speed = provider.speed_multipliers().grinder;
    let mut totals = ScanTotals::default();
    for id in &snapshot.structures {
        let Some(view) = provider.structure(*id) else {
            continue;
        };
        if view.physics.is_none() || view.closed {
            continue;
        }
        let blocks = provider.blocks(*id);
        totals.block_count += blocks.len();
        let mut missing = ComponentCounts::new();
        for block in &blocks {
            totals.seconds += block_secs(
                block.build_fraction(),
                block,
                speed,
                snapshot.grind_multiplier,
                tuning.stats_min_block_secs,
            );
            add_components(&mut totals.components, &block.components);
            add_components(&mut missing, &block.missing);
        }
        for (name, count) in missing {
            if let Some(total) = totals.components.get_mut(&name) {
                *total = total.saturating_sub(count);
            }
        }
    }
    totals
}

fn weld_totals(
    snapshot: &YardSnapshot,
    provider: &dyn StructureProvider,
    tuning: &Tuning,
) -> ScanTotals {
    let open = |id: &StructureId| provider.structure(*id).filter(|s| !s.closed);

    let mut structures: BTreeSet<StructureId> = BTreeSet::new();
    for id in &snapshot.structures {
        if open(id).is_none() {
            continue;
        }
        structures.insert(*id);
        let projections = provider
            .blocks(*id)
            .into_iter()
            .filter_map(|b| b.kind.projected_structure())
            .filter(|p| open(p).is_some());
        structures.extend(projections);
    }

    let speed = provider.speed_multipliers().welder;
    let multiplier = snapshot.weld_multiplier;
    let floor = tuning.stats_min_block_secs;
    let mut totals = ScanTotals::default();
    for id in &structures {
        let Some(view) = open(id) else {
            continue;
        };
        let blocks = provider.blocks(*id);
        totals.block_count += blocks.len();
        for block in &blocks {
            if view.is_virtual() {
                totals.seconds += block_secs(1.0, block, speed, multiplier, floor);
                add_components(&mut totals.components, &block.components);
            } else {
                let work = 1.0 - block.build_fraction();
                totals.seconds += block_secs(work, block, speed, multiplier, floor);
                add_components(&mut totals.components, &block.missing);
            }
        }
    }
    totals
}

fn render(
    kind: StatsKind,
    snapshot: &YardSnapshot,
    totals: &ScanTotals,
    tuning: &Tuning,
) -> String {
    // Every beam of every tool works in parallel; tool count varies per yard.
    let divisor = (snapshot.beam_count * snapshot.tool_count).max(1) as f32;
    let seconds = totals.seconds / divisor;
    let scale =
        (snapshot.half_extents.length_squared() / tuning.stats_component_normalizer).max(1.0);

    let mut out = String::from("Scan Results:\n\n");
    let _ = writeln!(out, "Targets: {}", snapshot.working);
    let _ = writeln!(out, "Block Count: {}", totals.block_count);
    let heading = match kind {
        StatsKind::Grind => {
            let _ = writeln!(out, "Estimated Deconstruct Time: {}", format_estimate(seconds));
            Some("Estimated Component Gain:")
        }
        StatsKind::Weld => {
            let _ = writeln!(out, "Estimated Construct Time: {}", format_estimate(seconds));
            (!totals.components.is_empty()).then_some("Estimated Components Used:")
        }
    };
    if let Some(heading) = heading {
        out.push_str(heading);
        out.push_str("\n\n");
        for (name, count) in totals.components.iter().filter(|(_, c)| **c != 0) {
            let _ = writeln!(out, "{name}: {}", f64::from(*count) / scale);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use yard_core::test_fixtures::{
        base_world, base_yard, damaged_hull_at, detect, full_power_settings, hull_block,
        insert_hull, projected_block,
    };
    use yard_core::{
        BlockKind, BlockPos, BlockRef, MemoryStructure, MemoryWorld, SplitRegistry, YardSettings,
    };

    const HULL: StructureId = StructureId(2);
    const PROJECTION: StructureId = StructureId(5);

    fn detected_yard(world: &MemoryWorld) -> Yard {
        let mut yard = base_yard(true, full_power_settings(3));
        detect(&mut yard, world, &mut SplitRegistry::new());
        yard
    }

    fn damaged_world() -> MemoryWorld {
        let mut world = base_world();
        damaged_hull_at(&mut world, HULL, &[10.0]);
        world
    }

    fn wait_for_scan(scanner: &StatsScanner, yard: YardId) {
        for _ in 0..500 {
            if scanner.scan_finished(yard) {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("stats scan did not finish");
    }

    #[test]
    fn grind_scan_nets_out_missing_components() {
        let world = damaged_world();
        let yard = detected_yard(&world);
        let text = scan(StatsKind::Grind, &YardSnapshot::of(&yard), &world, &Tuning::default());
        assert_eq!(
            text,
            "Scan Results:\n\nTargets: 0\nBlock Count: 1\n\
             Estimated Deconstruct Time: 0.33s\nEstimated Component Gain:\n\nSteelPlate: 5\n"
        );
    }

    #[test]
    fn weld_scan_counts_remaining_work_and_missing_parts() {
        let world = damaged_world();
        let yard = detected_yard(&world);
        let text = scan(StatsKind::Weld, &YardSnapshot::of(&yard), &world, &Tuning::default());
        assert_eq!(
            text,
            "Scan Results:\n\nTargets: 0\nBlock Count: 1\n\
             Estimated Construct Time: 3.00s\nEstimated Components Used:\n\nSteelPlate: 5\n"
        );
    }

    #[test]
    fn weld_scan_of_finished_hull_omits_components() {
        let mut world = base_world();
        insert_hull(
            &mut world,
            HULL,
            vec![hull_block(HULL, BlockPos::new(0, 0, 0), DVec3::new(10.0, 0.0, 0.0))],
        );
        let yard = detected_yard(&world);
        let text = scan(StatsKind::Weld, &YardSnapshot::of(&yard), &world, &Tuning::default());
        assert_eq!(
            text,
            "Scan Results:\n\nTargets: 0\nBlock Count: 1\nEstimated Construct Time: 0.17s\n"
        );
    }

    #[test]
    fn weld_scan_includes_projected_blocks_at_full_cost() {
        let mut world = base_world();
        let projector_ref = BlockRef::new(HULL, BlockPos::new(0, 0, 0));
        let projector = BlockView {
            kind: BlockKind::Projector {
                projected: Some(PROJECTION),
            },
            ..hull_block(HULL, projector_ref.pos, DVec3::new(25.0, 5.0, 0.0))
        };
        insert_hull(&mut world, HULL, vec![projector]);
        world.insert_structure(PROJECTION, MemoryStructure::projection(projector_ref));
        for (i, x) in [10.0, 20.0].into_iter().enumerate() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let pos = BlockPos::new(i as i32, 0, 0);
            world.insert_block(projected_block(PROJECTION, pos, DVec3::new(x, 0.0, 0.0)));
        }
        let yard = detected_yard(&world);

        let text = scan(StatsKind::Weld, &YardSnapshot::of(&yard), &world, &Tuning::default());
        // 0.5 s floor for the finished projector, 10 s per projected block, over 3 beams.
        assert_eq!(
            text,
            "Scan Results:\n\nTargets: 0\nBlock Count: 3\n\
             Estimated Construct Time: 6.83s\nEstimated Components Used:\n\nSteelPlate: 20\n"
        );
    }

    #[test]
    fn result_is_withheld_then_cached() {
        let world = Arc::new(damaged_world());
        let mut yard = detected_yard(&world);
        let scanner = StatsScanner::new(world, Tuning::default());
        let id = yard.id();

        assert_eq!(scanner.format_grind_stats(&yard, Duration::ZERO), SCAN_PLACEHOLDER);
        wait_for_scan(&scanner, id);
        assert_eq!(
            scanner.format_grind_stats(&yard, Duration::from_millis(1000)),
            SCAN_PLACEHOLDER
        );

        let first = scanner.format_grind_stats(&yard, Duration::from_millis(6000));
        assert!(first.starts_with("Scan Results:"));

        yard.set_settings(YardSettings {
            grind_multiplier: 0.01,
            ..full_power_settings(1)
        });
        let second = scanner.format_grind_stats(&yard, Duration::from_millis(6100));
        assert_eq!(first, second);
    }

    #[test]
    fn clear_and_kind_change_restart_the_scan() {
        let world = Arc::new(damaged_world());
        let yard = detected_yard(&world);
        let scanner = StatsScanner::new(world, Tuning::default());
        let id = yard.id();

        scanner.format_grind_stats(&yard, Duration::ZERO);
        wait_for_scan(&scanner, id);
        assert_ne!(
            scanner.format_grind_stats(&yard, Duration::from_secs(10)),
            SCAN_PLACEHOLDER
        );

        let weld = scanner.format_weld_stats(&yard, Duration::from_secs(11));
        assert_eq!(weld, SCAN_PLACEHOLDER);
        wait_for_scan(&scanner, id);
        assert!(scanner
            .format_weld_stats(&yard, Duration::from_secs(17))
            .contains("Estimated Construct Time"));

        scanner.clear(id);
        assert!(!scanner.scan_finished(id));
        assert_eq!(
            scanner.format_weld_stats(&yard, Duration::from_secs(18)),
            SCAN_PLACEHOLDER
        );
    }
}
