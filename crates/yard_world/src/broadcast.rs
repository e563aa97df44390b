use parking_lot::Mutex;
use yard_core::{Broadcast, ToolId, YardId, YardSettings, YardState};

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    YardState { yard: YardId, state: YardState },
    ToolPower { tool: ToolId, power: f64 },
    SettingsChanged { yard: YardId, settings: YardSettings },
}

/// Broadcast sink that keeps every message, standing in for the network.
#[derive(Debug, Default)]
pub struct RecordingBroadcast {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BroadcastEvent> {
        self.events.lock().clone()
    }

    /// Everything recorded since the last call.
    pub fn take(&self) -> Vec<BroadcastEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn state_changes(&self, yard: YardId) -> Vec<YardState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BroadcastEvent::YardState { yard: y, state } if *y == yard => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Broadcast for RecordingBroadcast {
    fn yard_state(&self, yard: YardId, state: YardState) {
        tracing::debug!(%yard, %state, "broadcast yard state");
        self.events
            .lock()
            .push(BroadcastEvent::YardState { yard, state });
    }

    fn tool_power(&self, tool: ToolId, power: f64) {
        self.events
            .lock()
            .push(BroadcastEvent::ToolPower { tool, power });
    }

    fn settings_changed(&self, yard: YardId, settings: &YardSettings) {
        tracing::debug!(%yard, "broadcast settings");
        self.events.lock().push(BroadcastEvent::SettingsChanged {
            yard,
            settings: settings.clone(),
        });
    }
}
