//! `yard_runtime`: drives yard_core on a background worker.
//!
//! A `Session` owns every yard. Each tick the `PipelineRunner` hands the
//! session to a rayon task that runs the subsystems once, then takes it back
//! and applies the resulting effects on the calling thread. Other threads go
//! through a `SessionHandle`.

mod config;
mod directory;
pub mod draw;
mod inbox;
mod menu;
mod pipeline;
mod runner;
mod session;
pub mod stats;
pub mod subsystems;

pub use config::SessionConfig;
pub use directory::YardDirectory;
pub use draw::{compute_draw_frame, Color, DrawBox, DrawFrame, DrawLine};
pub use inbox::{Command, Inbox};
pub use menu::{MenuBoard, MenuPage};
pub use pipeline::{PassOutput, Pipeline, PipelineFault, Subsystem};
pub use runner::{Collected, PipelineRunner, TickOutcome};
pub use session::{PassContext, Session, SessionHandle};
pub use stats::{scan, StatsKind, StatsScanner, YardSnapshot, SCAN_PLACEHOLDER};
pub use subsystems::{ConveyorCache, Detection, MenuRefresh, YardAction};
