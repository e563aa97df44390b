use super::*;

#[test]
fn weld_init_enables_tools_and_assigns_nearest() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));

    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );

    assert_eq!(yard.state(), YardState::Weld);
    assert!(yard.working().contains(&HULL));
    assert!(yard.contained().is_empty());
    assert!(out
        .iter()
        .any(|e| matches!(e, Effect::EnableTool { tool } if *tool == TOOL)));
    assert_eq!(out.state_broadcasts(YARD), 1);
    assert_eq!(yard.assignments().active_count(), 2);

    let work: Vec<_> = out
        .iter()
        .filter_map(|e| match e {
            Effect::Work(order) => Some(*order),
            _ => None,
        })
        .collect();
    assert_eq!(work.len(), 2);
    assert!(work.iter().all(|o| o.mode == WorkMode::Weld));
    // 10 integrity/s * 1.0 multiplier * 0.1 s
    assert!(work.iter().all(|o| (o.amount - 1.0).abs() < 1e-6));

    let powers = tool_powers(&out);
    assert_eq!(powers.len(), 1);
    assert!((powers[0] - power_at(&[10.0, 20.0])).abs() < 1e-9);
}

#[test]
fn init_twice_subscribes_once() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));

    detect(&mut yard, &world, &mut splits);
    yard.request(Transition::Enter(YardState::Weld));
    yard.request(Transition::Enter(YardState::Weld));
    let tuning = Tuning::default();
    let mut out = Outbox::new();
    let mut ctx = tick_context(&world, &mut splits, &tuning, 0);
    yard.tick(&mut ctx, &mut out);

    assert_eq!(out.state_broadcasts(YARD), 1);
    assert_eq!(splits.subscription_count(), 1);

    let again = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        100,
    );
    assert_eq!(again.state_broadcasts(YARD), 0);
    assert_eq!(splits.subscription_count(), 1);
}

#[test]
fn disable_from_weld_clears_slots_and_broadcasts_once() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );
    assert_eq!(yard.assignments().active_count(), 2);

    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Disable { broadcast: true }),
        100,
    );

    assert_eq!(yard.state(), YardState::Disabled);
    assert_eq!(yard.assignments().active_count(), 0);
    assert!(yard.working().is_empty());
    assert!(yard.catalog().is_empty());
    assert_eq!(splits.subscription_count(), 0);
    assert_eq!(out.state_broadcasts(YARD), 1);
    let powers = tool_powers(&out);
    assert_eq!(powers.len(), 1);
    assert!((powers[0] - 5.0).abs() < 1e-12);
    assert!(!out.iter().any(|e| matches!(e, Effect::Work(_))));
}

#[test]
fn silent_disable_does_not_broadcast() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Grind)),
        0,
    );

    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Disable { broadcast: false }),
        100,
    );
    assert_eq!(yard.state(), YardState::Disabled);
    assert_eq!(out.state_broadcasts(YARD), 0);
}

#[test]
fn non_authoritative_peer_never_broadcasts_state() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    let tuning = Tuning::default();

    detect(&mut yard, &world, &mut splits);
    yard.request(Transition::Enter(YardState::Weld));
    yard.request(Transition::Disable { broadcast: true });
    let mut out = Outbox::new();
    let mut ctx = tick_context(&world, &mut splits, &tuning, 0);
    ctx.authoritative = false;
    yard.tick(&mut ctx, &mut out);

    assert_eq!(yard.state(), YardState::Disabled);
    assert_eq!(out.state_broadcasts(YARD), 0);
}

#[test]
fn weld_to_grind_keeps_working_set() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );

    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Grind)),
        100,
    );

    assert_eq!(yard.state(), YardState::Grind);
    assert!(yard.working().contains(&HULL));
    assert_eq!(splits.subscription_count(), 1);
    assert_eq!(out.state_broadcasts(YARD), 1);
    assert!(!out.iter().any(|e| matches!(e, Effect::EnableTool { .. })));
    assert!(out
        .iter()
        .filter_map(|e| match e {
            Effect::Work(order) => Some(order.mode),
            _ => None,
        })
        .all(|mode| mode == WorkMode::Grind));
    assert_eq!(yard.assignments().active_count(), 2);
}

#[test]
fn invalid_tools_park_yard_until_revalidated() {
    let mut world = base_world();
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    let tool_ref = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 0, 0));
    let removed = world.remove_block(tool_ref).unwrap();

    detect(&mut yard, &world, &mut splits);
    assert_eq!(yard.validate_tools(8), Err(InvalidTools::NoFunctionalTool));

    let out = pass(&mut yard, &world, &mut splits, Some(Transition::Invalidate), 0);
    assert_eq!(yard.state(), YardState::Invalid);
    assert!(out.iter().any(|e| matches!(
        e,
        Effect::ToolPowerFloor { tool, power } if *tool == TOOL && (*power - 5.0).abs() < 1e-12
    )));

    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        100,
    );
    assert_eq!(yard.state(), YardState::Invalid);

    world.insert_block(removed);
    detect(&mut yard, &world, &mut splits);
    assert_eq!(yard.validate_tools(8), Ok(()));
    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Disable { broadcast: true }),
        200,
    );
    assert_eq!(yard.state(), YardState::Disabled);
    assert_eq!(out.state_broadcasts(YARD), 1);
    assert!(out
        .iter()
        .any(|e| matches!(e, Effect::ToolPowerFloor { .. })));
}

#[test]
fn tool_validation_limits() {
    let tuning = Tuning::default();
    let mut spec = test_fixtures::yard_spec(true);
    spec.tools.clear();
    let empty = Yard::new(spec.clone(), YardSettings::default(), &tuning);
    assert_eq!(empty.validate_tools(8), Err(InvalidTools::NoTools));

    let tool_ref = BlockRef::new(YARD_STRUCTURE, BlockPos::new(0, 0, 0));
    spec.tools = (0..9)
        .map(|i| ToolSlot::new(ToolId(i), tool_ref, DVec3::ZERO))
        .collect();
    let crowded = Yard::new(spec, YardSettings::default(), &tuning);
    assert_eq!(crowded.validate_tools(8), Err(InvalidTools::TooManyTools(9)));
}

#[test]
fn scanning_is_an_overlay() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));

    let out = pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Scanning)),
        0,
    );
    assert_eq!(yard.state(), YardState::Disabled);
    assert_eq!(yard.display_state(), YardState::Scanning);
    assert_eq!(out.state_broadcasts(YARD), 0);
    assert_eq!(yard.assignments().active_count(), 0);

    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        100,
    );
    assert!(!yard.is_scanning());
    assert_eq!(yard.display_state(), YardState::Weld);
}

#[test]
fn split_fragment_inside_yard_stays_assignable() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );

    let fragment = StructureId(3);
    let moved_pos = BlockPos::new(1, 0, 0);
    assert!(world.split(HULL, fragment, &[moved_pos]));
    assert!(yard.notify_split(HULL, fragment, &mut splits));
    assert!(splits.is_subscribed(fragment, YARD));

    pass(&mut yard, &world, &mut splits, None, 100);

    assert!(yard.working().contains(&fragment));
    assert!(yard
        .assignments()
        .contains(BlockRef::new(fragment, moved_pos)));
    assert!(!yard.assignments().contains(BlockRef::new(HULL, moved_pos)));
}

#[test]
fn ejected_fragment_dropped_on_next_detection() {
    let mut world = base_world();
    damaged_hull_at(&mut world, HULL, &[10.0, 20.0]);
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    pass(
        &mut yard,
        &world,
        &mut splits,
        Some(Transition::Enter(YardState::Weld)),
        0,
    );

    let fragment = StructureId(3);
    world.split(HULL, fragment, &[BlockPos::new(1, 0, 0)]);
    yard.notify_split(HULL, fragment, &mut splits);
    world.translate(fragment, DVec3::new(500.0, 0.0, 0.0));

    pass(&mut yard, &world, &mut splits, None, 100);

    assert!(!yard.working().contains(&fragment));
    assert!(!splits.is_subscribed(fragment, YARD));
    assert!(yard.working().contains(&HULL));
    assert_eq!(yard.assignments().active_count(), 1);
}

#[test]
fn split_of_untracked_structure_is_ignored() {
    let world = base_world();
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));
    detect(&mut yard, &world, &mut splits);
    assert!(!yard.notify_split(HULL, StructureId(9), &mut splits));
    assert_eq!(splits.subscription_count(), 0);
}

#[test]
fn forgotten_power_is_reported_again() {
    let world = base_world();
    let mut splits = SplitRegistry::new();
    let mut yard = base_yard(true, full_power_settings(3));

    let first = pass(&mut yard, &world, &mut splits, None, 0);
    assert_eq!(tool_powers(&first).len(), 1);
    let unchanged = pass(&mut yard, &world, &mut splits, None, 100);
    assert!(tool_powers(&unchanged).is_empty());

    yard.forget_reported_power();
    assert_eq!(yard.last_power(0), None);
    let again = pass(&mut yard, &world, &mut splits, None, 200);
    let powers = tool_powers(&again);
    assert_eq!(powers.len(), 1);
    assert!((powers[0] - 5.0).abs() < 1e-9);
}
