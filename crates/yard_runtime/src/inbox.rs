//! Requests from the simulation thread, drained by the pipeline at the start
//! of each pass.

use std::collections::VecDeque;

use parking_lot::Mutex;
use yard_core::{StructureId, Transition, YardId, YardSpec};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register(Box<YardSpec>),
    Remove(YardId),
    Transition {
        yard: YardId,
        transition: Transition,
    },
    Split {
        old: StructureId,
        new: StructureId,
    },
}

#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<Command>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        self.queue.lock().push_back(command);
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<Command> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
