//! One pass over every subsystem, in a fixed order, as a single unit of work.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use yard_core::Outbox;

use crate::config::SessionConfig;
use crate::session::{PassContext, Session};
use crate::subsystems::{ConveyorCache, Detection, MenuRefresh, YardAction};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineFault {
    #[error("subsystem {subsystem} panicked: {message}")]
    Panicked {
        subsystem: &'static str,
        message: String,
    },
    #[error("pipeline worker exited without returning the session")]
    WorkerLost,
}

impl PipelineFault {
    pub fn subsystem(&self) -> Option<&'static str> {
        match self {
            PipelineFault::Panicked { subsystem, .. } => Some(*subsystem),
            PipelineFault::WorkerLost => None,
        }
    }
}

pub trait Subsystem: Send {
    fn name(&self) -> &'static str;

    /// Minimum time between runs. `None` runs on every pass.
    fn interval(&self, config: &SessionConfig) -> Option<Duration>;

    /// Skipped on peers that are not authoritative.
    fn server_only(&self) -> bool {
        false
    }

    fn run(&mut self, session: &mut Session, pass: &PassContext, out: &mut Outbox);
}

struct Stage {
    subsystem: Box<dyn Subsystem>,
    last_run: Option<Duration>,
}

impl Stage {
    fn should_run(&self, config: &SessionConfig, now: Duration) -> bool {
        if self.subsystem.server_only() && !config.authoritative {
            return false;
        }
        match self.subsystem.interval(config) {
            None => true,
            Some(interval) => self
                .last_run
                .is_none_or(|last| now.saturating_sub(last) >= interval),
        }
    }
}

/// Everything a pass produced. A faulted pass still carries the effects
/// gathered before the fault, since the session already reflects them.
#[derive(Debug)]
pub struct PassOutput {
    pub out: Outbox,
    pub fault: Option<PipelineFault>,
}

/// The session plus the subsystems that run over it.
pub struct Pipeline {
    session: Session,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// A pipeline with no subsystems.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            stages: Vec::new(),
        }
    }

    /// Yard actions, menu refresh, detection and conveyor cache, in that order.
    pub fn standard(session: Session) -> Self {
        Self::new(session)
            .with_subsystem(YardAction)
            .with_subsystem(MenuRefresh)
            .with_subsystem(Detection)
            .with_subsystem(ConveyorCache)
    }

    #[must_use]
    pub fn with_subsystem(mut self, subsystem: impl Subsystem + 'static) -> Self {
        self.stages.push(Stage {
            subsystem: Box::new(subsystem),
            last_run: None,
        });
        self
    }

    pub fn subsystem_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.subsystem.name()).collect()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Run every due subsystem. A panic stops the pass and leaves the
    /// subsystem's schedule untouched, so it runs again next pass. Effects
    /// gathered up to the panic are kept, and every yard re-reports its
    /// power on the next pass.
    pub fn run_pass(&mut self, now: Duration) -> PassOutput {
        let dt = self
            .session
            .last_pass
            .map_or(0.0, |last| now.saturating_sub(last).as_secs_f64());
        self.session.last_pass = Some(now);
        let pass = PassContext { now, dt };
        let mut out = Outbox::new();

        for stage in &mut self.stages {
            if !stage.should_run(&self.session.config, now) {
                continue;
            }
            let name = stage.subsystem.name();
            tracing::debug!(subsystem = name, "running subsystem");
            let session = &mut self.session;
            let subsystem = &mut stage.subsystem;
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                subsystem.run(session, &pass, &mut out);
            }));
            if let Err(payload) = result {
                self.session.forget_reported_power();
                return PassOutput {
                    out,
                    fault: Some(PipelineFault::Panicked {
                        subsystem: name,
                        message: panic_message(payload.as_ref()),
                    }),
                };
            }
            stage.last_run = Some(now);
        }
        PassOutput { out, fault: None }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
