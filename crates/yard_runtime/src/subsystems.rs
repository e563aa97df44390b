//! The per-pass subsystems run by the pipeline.

use std::time::Duration;

use yard_core::classify::classify_nearby;
use yard_core::status::{format_main_menu, format_status};
use yard_core::{BlockRef, Outbox, StructureId, StructureProvider, Transition, Yard, YardState};

use crate::config::SessionConfig;
use crate::menu::MenuPage;
use crate::pipeline::Subsystem;
use crate::session::{PassContext, Session};

/// Drains queued commands, then runs every yard's state machine and beam
/// cycle. Runs on every pass.
#[derive(Debug, Default)]
pub struct YardAction;

impl Subsystem for YardAction {
    fn name(&self) -> &'static str {
        "yard_action"
    }

    fn interval(&self, _config: &SessionConfig) -> Option<Duration> {
        None
    }

    fn run(&mut self, session: &mut Session, pass: &PassContext, out: &mut Outbox) {
        for command in session.inbox.drain() {
            session.apply_command(command);
        }
        session.tick_yards(pass, out);
        session.directory.publish_states(session.yards.values());
    }
}

/// Publishes status and main-menu text for every yard.
#[derive(Debug, Default)]
pub struct MenuRefresh;

impl Subsystem for MenuRefresh {
    fn name(&self) -> &'static str {
        "menu_refresh"
    }

    fn interval(&self, config: &SessionConfig) -> Option<Duration> {
        Some(config.menu_interval())
    }

    fn server_only(&self) -> bool {
        true
    }

    fn run(&mut self, session: &mut Session, _pass: &PassContext, _out: &mut Outbox) {
        for yard in session.yards.values() {
            session.menu.publish(
                yard.id(),
                MenuPage {
                    status: format_status(yard),
                    main_menu: format_main_menu(yard),
                },
            );
        }
        let yards = &session.yards;
        session.menu.retain(|id| yards.contains_key(&id));
    }
}

/// Validates tools, reclassifies nearby structures, releases split tracking
/// of structures that are gone and republishes the tool directory.
#[derive(Debug, Default)]
pub struct Detection;

impl Subsystem for Detection {
    fn name(&self) -> &'static str {
        "detection"
    }

    fn interval(&self, config: &SessionConfig) -> Option<Duration> {
        Some(config.detection_interval())
    }

    fn run(&mut self, session: &mut Session, _pass: &PassContext, _out: &mut Outbox) {
        let Session {
            yards,
            splits,
            provider,
            config,
            directory,
            ..
        } = session;
        let provider: &dyn StructureProvider = provider.as_ref();

        for yard in yards.values_mut() {
            yard.refresh_tools(provider);
            revalidate(yard, config.tuning.max_tools);
            let classification = classify_nearby(provider, yard.bounds(), yard.structure());
            let delta = yard.apply_classification(classification, splits);
            if !delta.is_empty() {
                tracing::debug!(
                    yard = %yard.id(),
                    added = ?delta.added,
                    removed = ?delta.removed,
                    "yard contents changed"
                );
            }
        }

        let gone: Vec<StructureId> = splits
            .structures()
            .filter(|id| provider.structure(*id).is_none_or(|s| s.closed))
            .collect();
        for id in gone {
            for yard_id in splits.forget_structure(id) {
                if let Some(yard) = yards.get_mut(&yard_id) {
                    yard.forget_structure(id, splits);
                }
            }
            tracing::debug!(structure = %id, "released tracking of closed structure");
        }

        directory.publish_tools(yards.values());
    }
}

fn revalidate(yard: &mut Yard, max_tools: usize) {
    match yard.validate_tools(max_tools) {
        Err(reason) if yard.state() != YardState::Invalid => {
            tracing::warn!(yard = %yard.id(), %reason, "tool configuration invalid");
            yard.request(Transition::Invalidate);
        }
        Ok(()) if yard.state() == YardState::Invalid => {
            tracing::info!(yard = %yard.id(), "tool configuration valid again");
            yard.request(Transition::Disable { broadcast: true });
        }
        _ => {}
    }
}

/// Recomputes the cargo blocks that feed each yard's tools.
#[derive(Debug, Default)]
pub struct ConveyorCache;

impl Subsystem for ConveyorCache {
    fn name(&self) -> &'static str {
        "conveyor_cache"
    }

    fn interval(&self, config: &SessionConfig) -> Option<Duration> {
        Some(config.conveyor_interval())
    }

    fn server_only(&self) -> bool {
        true
    }

    fn run(&mut self, session: &mut Session, _pass: &PassContext, _out: &mut Outbox) {
        let provider: &dyn StructureProvider = session.provider.as_ref();
        for yard in session.yards.values_mut() {
            let cargo = connected_cargo(provider, yard);
            yard.set_cargo(cargo);
        }
    }
}

/// Inventories on the yard's own structure reachable from its first tool.
fn connected_cargo(provider: &dyn StructureProvider, yard: &Yard) -> Vec<BlockRef> {
    let Some(anchor) = yard.tools().iter().find_map(|t| t.block) else {
        return Vec::new();
    };
    provider
        .blocks(yard.structure())
        .into_iter()
        .filter(|b| b.kind.supplies_components())
        .map(|b| b.block)
        .filter(|b| provider.inventory(*b).is_some() && provider.inventories_connected(anchor, *b))
        .collect()
}
