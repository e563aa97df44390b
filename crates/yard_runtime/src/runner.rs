//! Single-flight background runner.
//!
//! The pipeline (session included) is moved into a rayon task and moved back
//! when the simulation thread collects it. A new pass is dispatched only
//! after the previous one has been collected, so at most one pass exists at
//! any time and nothing in the session needs a lock. Effects are applied on
//! the collecting thread, in the order the pass produced them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use yard_core::{Broadcast, ToolControl};

use crate::pipeline::{PassOutput, Pipeline, PipelineFault};
use crate::session::Session;

/// What a call to [`PipelineRunner::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous pass (if any) was applied and a new one started.
    Dispatched,
    /// The previous pass is still running.
    Busy,
    /// Shutdown was requested; nothing was dispatched.
    Closing,
    /// The collected pass faulted. Effects gathered before the fault were
    /// applied; the faulted subsystem runs again next pass.
    Recovered(PipelineFault),
}

/// Result of collecting the in-flight pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    /// Nothing was in flight.
    Nothing,
    Pending,
    Applied,
    Recovered(PipelineFault),
}

struct Completed {
    pipeline: Box<Pipeline>,
    output: PassOutput,
}

enum Slot {
    Idle(Box<Pipeline>),
    InFlight(Receiver<Completed>),
    /// The worker dropped the pipeline. Unrecoverable.
    Lost,
}

pub struct PipelineRunner {
    slot: Slot,
    closing: Arc<AtomicBool>,
    diagnostic: bool,
    dispatched: u64,
    faults: u64,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = match self.slot {
            Slot::Idle(_) => "idle",
            Slot::InFlight(_) => "in_flight",
            Slot::Lost => "lost",
        };
        f.debug_struct("PipelineRunner")
            .field("slot", &slot)
            .field("closing", &self.is_closing())
            .field("dispatched", &self.dispatched)
            .field("faults", &self.faults)
            .finish()
    }
}

impl PipelineRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        let diagnostic = pipeline.session().config().diagnostic;
        Self {
            slot: Slot::Idle(Box::new(pipeline)),
            closing: Arc::new(AtomicBool::new(false)),
            diagnostic,
            dispatched: 0,
            faults: 0,
        }
    }

    /// Collect the previous pass if it finished, then start the next one.
    /// Never blocks.
    ///
    /// In diagnostic mode a faulted pass is returned as `Err`; otherwise it
    /// is logged and reported as [`TickOutcome::Recovered`].
    pub fn tick(
        &mut self,
        now: Duration,
        tools: &mut dyn ToolControl,
        broadcast: &dyn Broadcast,
    ) -> Result<TickOutcome, PipelineFault> {
        match self.collect(false, tools, broadcast)? {
            Collected::Pending => return Ok(TickOutcome::Busy),
            Collected::Recovered(fault) => return Ok(TickOutcome::Recovered(fault)),
            Collected::Nothing | Collected::Applied => {}
        }
        if self.is_closing() {
            return Ok(TickOutcome::Closing);
        }
        self.dispatch(now);
        Ok(TickOutcome::Dispatched)
    }

    /// Block until the in-flight pass finishes and apply it.
    pub fn finish_pass(
        &mut self,
        tools: &mut dyn ToolControl,
        broadcast: &dyn Broadcast,
    ) -> Result<Collected, PipelineFault> {
        self.collect(true, tools, broadcast)
    }

    /// Stop dispatching, wait for the in-flight pass, then disable every
    /// yard without broadcasting.
    pub fn shutdown(
        &mut self,
        now: Duration,
        tools: &mut dyn ToolControl,
        broadcast: &dyn Broadcast,
    ) -> Result<(), PipelineFault> {
        self.close();
        self.finish_pass(tools, broadcast)?;
        let Slot::Idle(pipeline) = &mut self.slot else {
            return Err(PipelineFault::WorkerLost);
        };
        let session = pipeline.session_mut();
        let yards = session.yard_count();
        let mut out = session.disable_all(now);
        for effect in out.take() {
            effect.apply(tools, broadcast);
        }
        tracing::info!(yards, "session shut down");
        Ok(())
    }

    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Flag another thread can set to stop further dispatch.
    pub fn closing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closing)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.slot, Slot::InFlight(_))
    }

    /// The session, while no pass is in flight.
    pub fn session(&self) -> Option<&Session> {
        match &self.slot {
            Slot::Idle(pipeline) => Some(pipeline.session()),
            Slot::InFlight(_) | Slot::Lost => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        match &mut self.slot {
            Slot::Idle(pipeline) => Some(pipeline.session_mut()),
            Slot::InFlight(_) | Slot::Lost => None,
        }
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    fn dispatch(&mut self, now: Duration) {
        let mut pipeline = match std::mem::replace(&mut self.slot, Slot::Lost) {
            Slot::Idle(pipeline) => pipeline,
            other => {
                self.slot = other;
                return;
            }
        };
        let (tx, rx) = mpsc::channel();
        rayon::spawn(move || {
            let output = pipeline.run_pass(now);
            let _ = tx.send(Completed { pipeline, output });
        });
        self.slot = Slot::InFlight(rx);
        self.dispatched += 1;
    }

    fn collect(
        &mut self,
        block: bool,
        tools: &mut dyn ToolControl,
        broadcast: &dyn Broadcast,
    ) -> Result<Collected, PipelineFault> {
        let received = match &self.slot {
            Slot::Idle(_) => return Ok(Collected::Nothing),
            Slot::Lost => return Err(PipelineFault::WorkerLost),
            Slot::InFlight(rx) if block => rx.recv().ok(),
            Slot::InFlight(rx) => match rx.try_recv() {
                Ok(completed) => Some(completed),
                Err(TryRecvError::Empty) => return Ok(Collected::Pending),
                Err(TryRecvError::Disconnected) => None,
            },
        };
        let Some(Completed { pipeline, output }) = received else {
            self.slot = Slot::Lost;
            tracing::error!("pipeline worker exited without returning the session");
            return Err(PipelineFault::WorkerLost);
        };
        self.slot = Slot::Idle(pipeline);

        let PassOutput { mut out, fault } = output;
        for effect in out.take() {
            effect.apply(tools, broadcast);
        }
        match fault {
            None => Ok(Collected::Applied),
            Some(fault) => {
                self.faults += 1;
                tracing::error!(
                    subsystem = fault.subsystem().unwrap_or("unknown"),
                    %fault,
                    "pipeline pass faulted"
                );
                if self.diagnostic {
                    Err(fault)
                } else {
                    Ok(Collected::Recovered(fault))
                }
            }
        }
    }
}
