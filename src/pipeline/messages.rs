//! Message types passed between the capture callback, the decode worker,
//! the controller and the result sink

use std::time::Duration;

use crate::capture::frame::Frame;
use crate::capture::geometry::Rect;
use crate::mrz::MrzPayload;
use crate::vision::{OcrFailure, OcrResult};

/// How a decode job was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Part of the continuous scan loop; subject to the pending-decode latch
    Continuous,
    /// An explicit user-triggered capture
    SingleShot,
}

/// One frame submitted for recognition
#[derive(Debug)]
pub struct DecodeJob {
    /// The captured frame
    pub frame: Frame,
    /// Region of interest in capture coordinates, if the device was configured
    pub region: Option<Rect>,
    /// Which scan path requested the frame
    pub kind: JobKind,
}

/// Result of one accepted decode job
#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Recognized(OcrResult),
    Failed(OcrFailure),
}

/// Control messages for the decode worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerControl {
    /// Drain pending jobs and exit the run loop
    Quit,
}

/// Commands from the user-facing layer to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionCommand {
    /// On-screen shutter pressed
    Shutter,
    /// Hardware camera key pressed
    HardwareShutter,
    /// Pause continuous scanning
    Stop,
    /// Resume continuous scanning after a pause
    Resume,
    /// Leave the result view and return to the live preview
    RestartPreview,
    /// Resize the region of interest by a drag gesture
    AdjustRegion { delta_width: i32, delta_height: i32 },
    /// Focus after the given delay
    AutoFocus(Duration),
    /// Switch the torch on or off
    SetTorch(bool),
    /// End the session
    Quit,
}

/// Messages handled on the controller's context
#[derive(Debug)]
pub enum ControllerMessage {
    /// The worker finished a job
    Decoded { kind: JobKind, outcome: DecodeOutcome },
    /// The worker hit a recognition fault and asks the session to stop
    StopRequested(String),
    /// A command from the user-facing layer
    Command(SessionCommand),
}

/// Notifications delivered to the result sink
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Continuous scan recognized text
    ContinuousResult(OcrResult),
    /// Continuous scan produced nothing usable
    ContinuousFailure(OcrFailure),
    /// Final single-shot result to display
    DecodeAccepted(OcrResult),
    /// A single-shot decode failed, or no cached result was available
    DecodeFailed,
    /// Enable or disable the capture button
    CaptureAffordance(bool),
    /// Redraw the framing overlay
    DrawViewfinder,
    /// The capture device could not be opened
    DeviceUnavailable(String),
    /// The recognition engine faulted; continuous scanning was paused
    RecognitionFault(String),
    /// A validated document was read; the session is over
    SessionComplete(MrzPayload),
    /// The controller reached its terminal state
    Stopped,
}
