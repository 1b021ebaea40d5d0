//! Pipeline controller
//!
//! Owns the scan state machine. It is the only writer of [`PipelineState`],
//! the only component that arms frame requests, and the only consumer of
//! worker outcomes.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::messages::{
    ControllerMessage, DecodeJob, DecodeOutcome, JobKind, SessionCommand, SessionEvent,
};
use super::state::{DecodeLatch, PipelineState, ScanMode};
use super::worker::DecodeWorker;
use crate::capture::FrameSource;
use crate::config::AppConfig;
use crate::error::Result;
use crate::mrz::{CompletionGate, PayloadValidator};
use crate::vision::{OcrResult, Recognizer};

/// Cloneable sender of commands to a running controller
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: Sender<ControllerMessage>,
}

impl ControllerHandle {
    /// Returns false if the controller is gone
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(ControllerMessage::Command(command)).is_ok()
    }

    pub fn shutter(&self) -> bool {
        self.send(SessionCommand::Shutter)
    }

    pub fn hardware_shutter(&self) -> bool {
        self.send(SessionCommand::HardwareShutter)
    }

    pub fn stop(&self) -> bool {
        self.send(SessionCommand::Stop)
    }

    pub fn resume(&self) -> bool {
        self.send(SessionCommand::Resume)
    }

    pub fn restart_preview(&self) -> bool {
        self.send(SessionCommand::RestartPreview)
    }

    pub fn adjust_region(&self, delta_width: i32, delta_height: i32) -> bool {
        self.send(SessionCommand::AdjustRegion {
            delta_width,
            delta_height,
        })
    }

    pub fn auto_focus(&self, delay: Duration) -> bool {
        self.send(SessionCommand::AutoFocus(delay))
    }

    pub fn set_torch(&self, on: bool) -> bool {
        self.send(SessionCommand::SetTorch(on))
    }

    pub fn quit(&self) -> bool {
        self.send(SessionCommand::Quit)
    }
}

pub struct PipelineController {
    state: PipelineState,
    mode: ScanMode,
    frame_source: FrameSource,
    worker: DecodeWorker,
    jobs: Sender<DecodeJob>,
    latch: DecodeLatch,
    gate: CompletionGate,
    inbox: Receiver<ControllerMessage>,
    events: Sender<SessionEvent>,
    last_result: Option<OcrResult>,
    shutdown_timeout: Duration,
}

impl PipelineController {
    /// Start the preview and the decode worker.
    ///
    /// The frame source must already be open. In continuous mode the first
    /// frame request is armed before this returns.
    pub fn new(
        frame_source: FrameSource,
        recognizer: Box<dyn Recognizer>,
        config: &AppConfig,
        validator: Box<dyn PayloadValidator>,
        events: Sender<SessionEvent>,
    ) -> Result<(Self, ControllerHandle)> {
        let (commands, inbox) = unbounded();
        let latch = DecodeLatch::new();

        let worker = DecodeWorker::spawn(
            recognizer,
            config.preprocess,
            config.recognition,
            latch.clone(),
            commands.clone(),
        )?;
        frame_source.start_preview()?;

        let mode = ScanMode::from_continuous(config.capture.continuous);
        let controller = Self {
            state: mode.initial_state(),
            mode,
            frame_source,
            jobs: worker.job_sender(),
            worker,
            latch,
            gate: CompletionGate::new(config.validation, validator),
            inbox,
            events,
            last_result: None,
            shutdown_timeout: config.worker.shutdown_timeout(),
        };

        info!("Pipeline controller started in {} state", controller.state);
        if controller.state == PipelineState::Continuous {
            controller.request_continuous_frame();
        }
        controller.emit(SessionEvent::CaptureAffordance(true));

        Ok((controller, ControllerHandle { commands }))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Most recent recognition, if any
    pub fn last_result(&self) -> Option<&OcrResult> {
        self.last_result.as_ref()
    }

    /// Handle one message. Returns false once the controller is done.
    pub fn handle_message(&mut self, message: ControllerMessage) -> bool {
        match message {
            ControllerMessage::Decoded { kind, outcome } => self.on_decoded(kind, outcome),
            ControllerMessage::StopRequested(reason) => self.on_stop_requested(reason),
            ControllerMessage::Command(command) => self.on_command(command),
        }
        self.state != PipelineState::Done
    }

    /// Handle at most one message, waiting up to `timeout`.
    /// Returns false once the controller is done.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => self.handle_message(message),
            Err(RecvTimeoutError::Timeout) => self.state != PipelineState::Done,
            Err(RecvTimeoutError::Disconnected) => {
                self.quit_synchronously();
                false
            }
        }
    }

    /// Handle messages until the controller is done
    pub fn run(mut self) {
        while self.state != PipelineState::Done {
            match self.inbox.recv() {
                Ok(message) => {
                    self.handle_message(message);
                }
                Err(_) => self.quit_synchronously(),
            }
        }
        debug!("Controller loop finished");
    }

    fn on_decoded(&mut self, kind: JobKind, outcome: DecodeOutcome) {
        if kind == JobKind::Continuous {
            self.latch.release();
        }
        if self.state == PipelineState::Done {
            return;
        }

        match kind {
            JobKind::Continuous => self.on_continuous_outcome(outcome),
            JobKind::SingleShot => self.on_single_shot_outcome(outcome),
        }
    }

    fn on_continuous_outcome(&mut self, outcome: DecodeOutcome) {
        match outcome {
            DecodeOutcome::Recognized(mut result) => {
                let payload = self.gate.evaluate(&mut result);
                self.last_result = Some(result.clone());
                self.emit(SessionEvent::ContinuousResult(result));

                if let Some(payload) = payload {
                    info!("Session complete: {} {}", payload.format, payload.document_number);
                    self.emit(SessionEvent::SessionComplete(payload));
                    self.quit_synchronously();
                    return;
                }
            }
            DecodeOutcome::Failed(failure) => {
                self.last_result = None;
                self.emit(SessionEvent::ContinuousFailure(failure));
            }
        }

        if self.state == PipelineState::Continuous {
            self.request_continuous_frame();
        }
    }

    fn on_single_shot_outcome(&mut self, outcome: DecodeOutcome) {
        if self.state != PipelineState::PreviewPaused {
            debug!("Single-shot outcome ignored in {} state", self.state);
            return;
        }

        match outcome {
            DecodeOutcome::Recognized(result) => {
                self.state = PipelineState::Success;
                self.last_result = Some(result.clone());
                self.emit(SessionEvent::DecodeAccepted(result));
            }
            DecodeOutcome::Failed(_) => {
                self.state = PipelineState::Previewing;
                self.emit(SessionEvent::DecodeFailed);
                self.emit(SessionEvent::CaptureAffordance(true));
            }
        }
    }

    fn on_stop_requested(&mut self, reason: String) {
        if self.state == PipelineState::Done {
            return;
        }
        warn!("Stopping scan after recognition fault: {}", reason);
        self.stop();
        self.emit(SessionEvent::RecognitionFault(reason));
    }

    fn on_command(&mut self, command: SessionCommand) {
        if self.state == PipelineState::Done {
            debug!("Ignoring {:?} after shutdown", command);
            return;
        }

        match command {
            SessionCommand::Shutter => self.shutter_triggered(),
            SessionCommand::HardwareShutter => self.hardware_shutter(),
            SessionCommand::Stop => self.stop(),
            SessionCommand::Resume => self.reset_state(),
            SessionCommand::RestartPreview => self.restart_preview(),
            SessionCommand::AdjustRegion {
                delta_width,
                delta_height,
            } => {
                self.frame_source.adjust_region(delta_width, delta_height);
                self.emit(SessionEvent::DrawViewfinder);
            }
            SessionCommand::AutoFocus(delay) => self.frame_source.request_auto_focus(delay),
            SessionCommand::SetTorch(on) => self.frame_source.set_torch(on),
            SessionCommand::Quit => self.quit_synchronously(),
        }
    }

    /// Pause continuous scanning. In-flight outcomes still reach the sink.
    pub fn stop(&mut self) {
        if self.state != PipelineState::Continuous {
            return;
        }
        self.state = PipelineState::ContinuousPaused;
        self.frame_source.cancel_request();
        debug!("Continuous scanning paused");
    }

    /// Resume continuous scanning after [`stop`](Self::stop)
    pub fn reset_state(&mut self) {
        if self.state != PipelineState::ContinuousPaused {
            return;
        }
        self.state = PipelineState::Continuous;
        self.request_continuous_frame();
        debug!("Continuous scanning resumed");
    }

    pub fn shutter_triggered(&mut self) {
        match self.mode {
            ScanMode::Continuous => {
                if !matches!(
                    self.state,
                    PipelineState::Continuous | PipelineState::ContinuousPaused
                ) {
                    return;
                }
                self.stop();
                match self.last_result.clone() {
                    Some(result) => {
                        self.state = PipelineState::Success;
                        self.emit(SessionEvent::DecodeAccepted(result));
                    }
                    None => {
                        self.emit(SessionEvent::DecodeFailed);
                        self.reset_state();
                    }
                }
            }
            ScanMode::SingleShot => {
                if !matches!(self.state, PipelineState::Previewing | PipelineState::Success) {
                    debug!("Shutter ignored in {} state", self.state);
                    return;
                }
                self.state = PipelineState::PreviewPaused;
                self.emit(SessionEvent::CaptureAffordance(false));
                self.frame_source
                    .request_frame(self.jobs.clone(), JobKind::SingleShot);
            }
        }
    }

    pub fn hardware_shutter(&mut self) {
        match self.mode {
            ScanMode::Continuous => self.shutter_triggered(),
            ScanMode::SingleShot if self.state == PipelineState::Previewing => {
                self.shutter_triggered()
            }
            ScanMode::SingleShot => debug!("Hardware shutter ignored in {} state", self.state),
        }
    }

    /// Leave the result view and go back to scanning
    pub fn restart_preview(&mut self) {
        if self.state != PipelineState::Success {
            return;
        }
        self.state = self.mode.initial_state();
        self.emit(SessionEvent::DrawViewfinder);
        self.emit(SessionEvent::CaptureAffordance(true));
        if self.state == PipelineState::Continuous {
            self.request_continuous_frame();
        }
    }

    /// Stop the preview, end the worker and discard queued messages.
    ///
    /// Waits for the worker at most the configured shutdown timeout.
    pub fn quit_synchronously(&mut self) {
        if self.state == PipelineState::Done {
            return;
        }
        self.state = PipelineState::Done;
        self.frame_source.stop_preview();
        self.frame_source.cancel_request();

        self.worker.quit();
        if !self.worker.join_timeout(self.shutdown_timeout) {
            warn!(
                "Decode worker did not stop within {:?}, detaching",
                self.shutdown_timeout
            );
        }

        let discarded = self.inbox.try_iter().count();
        if discarded > 0 {
            debug!("Discarded {} queued controller messages", discarded);
        }
        self.emit(SessionEvent::Stopped);
        info!("Pipeline controller stopped");
    }

    fn request_continuous_frame(&self) {
        self.frame_source
            .request_frame(self.jobs.clone(), JobKind::Continuous);
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Result sink gone");
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.quit_synchronously();
    }
}
