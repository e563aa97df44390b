//! Session state owned by the pipeline, and the handle other threads use to
//! talk to it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use yard_core::{
    BlockRef, Outbox, SettingsRepository, SplitRegistry, StructureId, StructureProvider,
    TickContext, ToolId, Transition, Yard, YardId, YardSettings, YardSpec, YardState,
};

use crate::config::SessionConfig;
use crate::directory::YardDirectory;
use crate::inbox::{Command, Inbox};
use crate::menu::MenuBoard;

/// Timing of the pass being run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassContext {
    pub now: Duration,
    /// Seconds since the previous pass; zero on the first.
    pub dt: f64,
}

/// All yards and their bookkeeping. Owned by whichever side holds the
/// pipeline, so nothing in here is locked.
pub struct Session {
    pub(crate) yards: BTreeMap<YardId, Yard>,
    pub(crate) splits: SplitRegistry,
    pub(crate) provider: Arc<dyn StructureProvider>,
    pub(crate) settings: Arc<SettingsRepository>,
    pub(crate) inbox: Arc<Inbox>,
    pub(crate) directory: Arc<YardDirectory>,
    pub(crate) menu: Arc<MenuBoard>,
    pub(crate) config: SessionConfig,
    pub(crate) last_pass: Option<Duration>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("yards", &self.yards.keys().collect::<Vec<_>>())
            .field("splits", &self.splits.subscription_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        provider: Arc<dyn StructureProvider>,
        settings: Arc<SettingsRepository>,
        config: SessionConfig,
    ) -> Self {
        Self {
            yards: BTreeMap::new(),
            splits: SplitRegistry::new(),
            provider,
            settings,
            inbox: Arc::new(Inbox::new()),
            directory: Arc::new(YardDirectory::new()),
            menu: Arc::new(MenuBoard::new()),
            config,
            last_pass: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            inbox: Arc::clone(&self.inbox),
            directory: Arc::clone(&self.directory),
            menu: Arc::clone(&self.menu),
            settings: Arc::clone(&self.settings),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn yards(&self) -> impl Iterator<Item = &Yard> {
        self.yards.values()
    }

    pub fn yard(&self, id: YardId) -> Option<&Yard> {
        self.yards.get(&id)
    }

    pub fn yard_count(&self) -> usize {
        self.yards.len()
    }

    pub fn splits(&self) -> &SplitRegistry {
        &self.splits
    }

    /// After a faulted pass the host may have missed power updates.
    pub(crate) fn forget_reported_power(&mut self) {
        for yard in self.yards.values_mut() {
            yard.forget_reported_power();
        }
    }

    pub fn provider(&self) -> &Arc<dyn StructureProvider> {
        &self.provider
    }

    pub(crate) fn apply_command(&mut self, command: Command) {
        match command {
            Command::Register(spec) => self.register(*spec),
            Command::Remove(id) => {
                if self.yards.remove(&id).is_none() {
                    tracing::warn!(yard = %id, "remove requested for unknown yard");
                    return;
                }
                let released = self.splits.unsubscribe_yard(id);
                self.directory.forget(id);
                tracing::info!(yard = %id, released, "yard removed");
            }
            Command::Transition { yard, transition } => match self.yards.get_mut(&yard) {
                Some(target) => target.request(transition),
                None => tracing::warn!(%yard, ?transition, "transition for unknown yard ignored"),
            },
            Command::Split { old, new } => self.dispatch_split(old, new),
        }
    }

    fn register(&mut self, spec: YardSpec) {
        let id = spec.id;
        if self.yards.remove(&id).is_some() {
            self.splits.unsubscribe_yard(id);
            tracing::warn!(yard = %id, "yard registered twice, replacing");
        }
        let tools = spec.tools.len();
        let yard = Yard::new(spec, self.settings.get(id), &self.config.tuning);
        self.yards.insert(id, yard);
        tracing::info!(yard = %id, tools, "yard registered");
    }

    fn dispatch_split(&mut self, old: StructureId, new: StructureId) {
        let subscribers = self.splits.subscribers(old);
        if subscribers.is_empty() {
            tracing::debug!(%old, %new, "split of untracked structure");
            return;
        }
        for id in subscribers {
            if let Some(yard) = self.yards.get_mut(&id) {
                yard.notify_split(old, new, &mut self.splits);
            }
        }
    }

    pub(crate) fn tick_yards(&mut self, pass: &PassContext, out: &mut Outbox) {
        let Self {
            yards,
            splits,
            provider,
            settings,
            config,
            ..
        } = self;
        for yard in yards.values_mut() {
            yard.set_settings(settings.get(yard.id()));
            let mut ctx = TickContext {
                provider: provider.as_ref(),
                splits: &mut *splits,
                tuning: &config.tuning,
                now: pass.now,
                dt: pass.dt,
                authoritative: config.authoritative,
            };
            yard.tick(&mut ctx, out);
        }
    }

    /// Disable every yard without broadcasting. Used on shutdown.
    pub(crate) fn disable_all(&mut self, now: Duration) -> Outbox {
        for yard in self.yards.values_mut() {
            yard.request(Transition::Disable { broadcast: false });
        }
        let mut out = Outbox::new();
        self.tick_yards(&PassContext { now, dt: 0.0 }, &mut out);
        self.directory.publish_states(self.yards.values());
        out
    }
}

/// Cheap, cloneable entry point for the simulation thread, the UI and the
/// network layer. Requests are queued and take effect on the next pass;
/// lookups read what the last pass published.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox: Arc<Inbox>,
    directory: Arc<YardDirectory>,
    menu: Arc<MenuBoard>,
    settings: Arc<SettingsRepository>,
}

impl SessionHandle {
    pub fn register_yard(&self, spec: YardSpec) {
        self.inbox.push(Command::Register(Box::new(spec)));
    }

    pub fn remove_yard(&self, yard: YardId) {
        self.inbox.push(Command::Remove(yard));
    }

    /// Ask a yard to enter `state`. `Disabled` broadcasts the change.
    pub fn request_transition(&self, yard: YardId, state: YardState) {
        self.inbox.push(Command::Transition {
            yard,
            transition: Transition::Enter(state),
        });
    }

    pub fn disable(&self, yard: YardId, broadcast: bool) {
        self.inbox.push(Command::Transition {
            yard,
            transition: Transition::Disable { broadcast },
        });
    }

    pub fn notify_split(&self, old: StructureId, new: StructureId) {
        self.inbox.push(Command::Split { old, new });
    }

    pub fn yard_for_tool(&self, tool: ToolId) -> Option<YardId> {
        self.directory.yard_for_tool(tool)
    }

    pub fn yard_for_block(&self, block: BlockRef) -> Option<YardId> {
        self.directory.yard_for_block(block)
    }

    pub fn yard_state(&self, yard: YardId) -> Option<YardState> {
        self.directory.yard_state(yard)
    }

    pub fn settings(&self, yard: YardId) -> YardSettings {
        self.settings.get(yard)
    }

    /// Store, persist and broadcast. Returns the clamped value.
    pub fn set_settings(&self, yard: YardId, settings: &YardSettings) -> YardSettings {
        self.settings.set(yard, settings)
    }

    pub fn status(&self, yard: YardId) -> Option<String> {
        self.menu.status(yard)
    }

    pub fn main_menu(&self, yard: YardId) -> Option<String> {
        self.menu.main_menu(yard)
    }

    pub fn pending_commands(&self) -> usize {
        self.inbox.len()
    }
}
