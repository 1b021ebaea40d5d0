//! Session Coordinator
//!
//! Opens the capture device, runs the pipeline controller on its own thread
//! and tears both down again, including when the session is dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, info_span, Span};
use uuid::Uuid;

use crate::capture::{CaptureDriver, DisplayTarget, FrameSource};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::mrz::PayloadValidator;
use crate::pipeline::{ControllerHandle, PipelineController, SessionEvent};
use crate::vision::Recognizer;

/// One running scan session
pub struct ScanSession {
    /// Identifies this session in logs
    pub id: Uuid,
    frame_source: FrameSource,
    handle: ControllerHandle,
    events: Option<Receiver<SessionEvent>>,
    controller_thread: Option<JoinHandle<()>>,
}

impl ScanSession {
    /// Open the device and start scanning. Events are read from [`events`](Self::events).
    pub fn start(
        config: &AppConfig,
        driver: Arc<dyn CaptureDriver>,
        display: DisplayTarget,
        recognizer: Box<dyn Recognizer>,
        validator: Box<dyn PayloadValidator>,
    ) -> Result<Self> {
        let (events_tx, events) = unbounded();
        let mut session =
            Self::start_with_sink(config, driver, display, recognizer, validator, events_tx)?;
        session.events = Some(events);
        Ok(session)
    }

    /// Start a session that reports to an existing result sink.
    ///
    /// A device that cannot be opened is sent to `sink` as
    /// [`SessionEvent::DeviceUnavailable`] as well as returned.
    pub fn start_with_sink(
        config: &AppConfig,
        driver: Arc<dyn CaptureDriver>,
        display: DisplayTarget,
        recognizer: Box<dyn Recognizer>,
        validator: Box<dyn PayloadValidator>,
        events_tx: Sender<SessionEvent>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let span = info_span!("session", %id);
        let _guard = span.enter();

        let frame_source = FrameSource::new(driver, config.capture.clone(), config.region);
        if let Err(e) = frame_source.open(&display) {
            error!("Could not open capture device: {}", e);
            let _ = events_tx.send(SessionEvent::DeviceUnavailable(e.to_string()));
            return Err(e);
        }

        let started = PipelineController::new(
            frame_source.clone(),
            recognizer,
            config,
            validator,
            events_tx,
        )
        .and_then(|(controller, handle)| {
            let thread = spawn_controller(controller, span.clone())?;
            Ok((handle, thread))
        });
        // A controller that never got its thread was dropped and has already quit
        let (handle, controller_thread) = match started {
            Ok(pair) => pair,
            Err(e) => {
                error!("Could not start pipeline: {}", e);
                frame_source.close();
                return Err(e);
            }
        };

        info!("Scan session started");
        Ok(Self {
            id,
            frame_source,
            handle,
            events: None,
            controller_thread: Some(controller_thread),
        })
    }

    /// Events for the result sink, unless the session was started with its own sink
    pub fn events(&self) -> Option<&Receiver<SessionEvent>> {
        self.events.as_ref()
    }

    /// Command sender for the user-facing layer
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn frame_source(&self) -> &FrameSource {
        &self.frame_source
    }

    /// Whether the controller thread is still running
    pub fn is_running(&self) -> bool {
        self.controller_thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Quit the controller, wait for it and release the device
    pub fn shutdown(&mut self) {
        let Some(thread) = self.controller_thread.take() else {
            return;
        };
        self.handle.quit();
        if thread.join().is_err() {
            error!(session = %self.id, "Controller thread panicked");
        }
        self.frame_source.close();
        info!(session = %self.id, "Scan session shut down");
    }
}

fn spawn_controller(controller: PipelineController, span: Span) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("pipeline-controller".into())
        .spawn(move || {
            let _guard = span.enter();
            info!("Controller thread starting...");
            controller.run();
            info!("Controller thread exiting...");
        })
        .map_err(Error::WorkerSpawn)
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
