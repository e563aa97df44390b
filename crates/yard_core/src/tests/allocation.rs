use super::*;

const SECOND_TOOL: ToolId = ToolId(2);

/// Yard with a second tool 5 m above the first, both on the yard structure.
fn two_tool_setup(beams: u8) -> (MemoryWorld, Yard) {
    let mut world = base_world();
    let second_ref = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 0, 2));
    world.insert_block(test_fixtures::tool_block(
        YARD_STRUCTURE,
        second_ref.pos,
        DVec3::new(0.0, 0.0, 5.0),
    ));
    let mut spec = test_fixtures::yard_spec(true);
    spec.tools.push(ToolSlot::new(
        SECOND_TOOL,
        second_ref,
        DVec3::new(0.0, 0.0, 5.0),
    ));
    let yard = Yard::new(spec, full_power_settings(beams), &Tuning::default());
    (world, yard)
}

fn assigned_keys(yard: &Yard) -> Vec<BlockRef> {
    yard.assignments()
        .active()
        .into_iter()
        .map(|(_, _, key)| key)
        .collect()
}

#[test]
fn two_tools_never_share_a_target() {
    let (mut world, mut yard) = two_tool_setup(3);
    let distances: Vec<f64> = (0..10).map(|i| 4.0 + f64::from(i) * 2.0).collect();
    damaged_hull_at(&mut world, HULL, &distances);
    let mut splits = SplitRegistry::new();

    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );

    let keys = assigned_keys(&yard);
    assert_eq!(keys.len(), 6);
    let unique: std::collections::BTreeSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), keys.len());
    assert_eq!(yard.assignments().active_on(0), 3);
    assert_eq!(yard.assignments().active_on(1), 3);
}

#[test]
fn assignments_never_exceed_budget_over_many_passes() {
    let (mut world, mut yard) = two_tool_setup(2);
    damaged_hull_at(&mut world, HULL, &[4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0]);
    let mut splits = SplitRegistry::new();
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Grind)),
        0,
    );
    for step in 1..20 {
        pass(&mut yard, &world, &mut splits, None, step * 100);
        let keys = assigned_keys(&yard);
        assert!(keys.len() <= 4, "pass {step}: {} beams", keys.len());
        let unique: std::collections::BTreeSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len(), "pass {step}");
    }
}

#[test]
fn lowering_beam_count_clears_upper_slots() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 12.0, 14.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );
    assert_eq!(yard.assignments().active_count(), 3);

    yard.set_settings(full_power_settings(1));
    pass(&mut yard, &world, &mut splits, None, 100);

    assert_eq!(yard.assignments().active_count(), 1);
    assert!(yard.assignments().assigned(0, 0).is_some());
    assert!(yard.assignments().assigned(0, 1).is_none());
    assert!(yard.assignments().assigned(0, 2).is_none());
}

#[test]
fn unpowered_tool_gets_no_beams_and_no_power() {
    let (mut world, mut yard) = two_tool_setup(3);
    damaged_hull_at(&mut world, HULL, &[10.0, 12.0, 14.0, 16.0]);
    world.remove_block(BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 0, 2)));
    let mut splits = SplitRegistry::new();

    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );

    assert_eq!(yard.assignments().active_on(0), 3);
    assert_eq!(yard.assignments().active_on(1), 0);
    let second_power = out.iter().find_map(|e| match e {
        Effect::ToolPower { tool, power } if *tool == SECOND_TOOL => Some(*power),
        _ => None,
    });
    assert!(second_power.is_some_and(|p| p.abs() < 1e-12));
}

#[test]
fn completed_target_is_replaced_on_the_same_pass() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0, 25.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(2));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );
    let nearest = BlockRef::new(HULL, BlockPos::new(0, 0, 0));
    let farthest = BlockRef::new(HULL, BlockPos::new(2, 0, 0));
    assert!(yard.assignments().contains(nearest));
    assert!(!yard.assignments().contains(farthest));

    let block = world.block_mut(nearest).unwrap();
    block.integrity = block.max_integrity;
    block.missing.clear();

    let out = pass(&mut yard, &world, &mut splits, None, 100);
    assert!(!yard.catalog().contains(nearest));
    assert!(yard.assignments().contains(farthest));
    assert_eq!(yard.assignments().active_count(), 2);
    let powers = tool_powers(&out);
    assert!((powers[0] - power_at(&[20.0, 25.0])).abs() < 1e-9);
}

#[test]
fn targets_beyond_reach_are_never_assigned() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    let tuning = Tuning {
        max_beam_reach_m: 15.0,
        ..Tuning::default()
    };

    detect(&mut yard, &world, &mut splits);
    yard.request(Transition::Enter(YardState::Weld));
    let mut out = Outbox::new();
    let mut ctx = tick_context(&world, &mut splits, &tuning, 0);
    yard.tick(&mut ctx, &mut out);

    assert_eq!(yard.catalog().len(), 1);
    assert_eq!(yard.assignments().active_count(), 1);
    assert!(yard
        .assignments()
        .contains(BlockRef::new(HULL, BlockPos::new(0, 0, 0))));
}

#[test]
fn table_operations() {
    let a = BlockRef::new(HULL, BlockPos::new(0, 0, 0));
    let b = BlockRef::new(HULL, BlockPos::new(1, 0, 0));
    let mut table = AssignmentTable::new(2);
    table.set(0, 0, Some(a));
    table.set(0, 2, Some(b));
    table.set(5, 0, Some(b));
    assert_eq!(table.active_count(), 2);

    table.truncate_beams(2);
    assert_eq!(table.active(), vec![(0, 0, a)]);

    table.set(1, 1, Some(b));
    table.retain(|key| key != a);
    assert_eq!(table.active(), vec![(1, 1, b)]);

    assert!(table.clear_target(b));
    assert!(!table.clear_target(b));
    assert_eq!(table.active_count(), 0);

    table.resize(3);
    assert_eq!(table.tool_count(), 3);
    assert!(table.slots(2).is_some_and(|s| s.iter().all(Option::is_none)));
}
