//! Capture to decode pipeline
//!
//! The frame source hands one armed frame at a time to the decode worker,
//! whose outcomes flow back to the controller. Only the controller re-arms.

pub mod controller;
pub mod messages;
pub mod state;
pub mod worker;

pub use controller::{ControllerHandle, PipelineController};
pub use messages::{
    ControllerMessage, DecodeJob, DecodeOutcome, JobKind, SessionCommand, SessionEvent,
    WorkerControl,
};
pub use state::{DecodeLatch, PipelineState, ScanMode};
pub use worker::DecodeWorker;
