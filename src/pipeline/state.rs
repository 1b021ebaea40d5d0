//! Controller state and the pending-decode latch

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State of a scan session, owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Single-shot mode, waiting for the shutter
    Previewing,
    /// Single-shot job submitted
    PreviewPaused,
    /// Scanning frames as fast as recognition allows
    Continuous,
    /// Continuous scanning paused; in-flight outcomes are still delivered
    ContinuousPaused,
    /// A single-shot result is on display
    Success,
    /// Terminal
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Previewing => "previewing",
            Self::PreviewPaused => "preview-paused",
            Self::Continuous => "continuous",
            Self::ContinuousPaused => "continuous-paused",
            Self::Success => "success",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// How frames are scheduled for recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Continuous,
    SingleShot,
}

impl ScanMode {
    pub fn from_continuous(continuous: bool) -> Self {
        if continuous {
            Self::Continuous
        } else {
            Self::SingleShot
        }
    }

    pub fn initial_state(self) -> PipelineState {
        match self {
            Self::Continuous => PipelineState::Continuous,
            Self::SingleShot => PipelineState::Previewing,
        }
    }
}

/// Set while a continuous decode job is outstanding.
///
/// Each session owns its own latch; the worker acquires it when it accepts a
/// continuous job and the controller releases it when the outcome arrives.
#[derive(Debug, Clone, Default)]
pub struct DecodeLatch {
    pending: Arc<AtomicBool>,
}

impl DecodeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the latch. Returns false if a job is already outstanding.
    pub fn try_acquire(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
