//! Decode worker
//!
//! A single dedicated thread that runs preprocessing and recognition one job
//! at a time and reports every accepted job's outcome to the controller.

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::messages::{ControllerMessage, DecodeJob, DecodeOutcome, JobKind, WorkerControl};
use super::state::DecodeLatch;
use crate::config::{PreprocessSettings, RecognitionSettings};
use crate::error::{Error, Result};
use crate::vision::{self, apply_preprocessing, OcrFailure, Recognizer};

/// Handle to the decode worker thread
pub struct DecodeWorker {
    jobs: Sender<DecodeJob>,
    control: Sender<WorkerControl>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    quit_sent: bool,
}

struct WorkerLoop {
    recognizer: Box<dyn Recognizer>,
    preprocess: PreprocessSettings,
    recognition: RecognitionSettings,
    latch: DecodeLatch,
    controller: Sender<ControllerMessage>,
}

impl DecodeWorker {
    /// Start the worker thread.
    ///
    /// Continuous jobs are admitted only while `latch` is free; the worker
    /// claims it and the controller releases it once the outcome is handled.
    pub fn spawn(
        recognizer: Box<dyn Recognizer>,
        preprocess: PreprocessSettings,
        recognition: RecognitionSettings,
        latch: DecodeLatch,
        controller: Sender<ControllerMessage>,
    ) -> Result<Self> {
        // One slot: a frame waiting here is never behind another
        let (jobs_tx, jobs_rx) = bounded::<DecodeJob>(1);
        let (control_tx, control_rx) = unbounded();
        let (done_tx, done_rx) = bounded(1);

        let worker = WorkerLoop {
            recognizer,
            preprocess,
            recognition,
            latch,
            controller,
        };
        // Worker logs carry the spawning session's span
        let span = tracing::Span::current();

        let handle = std::thread::Builder::new()
            .name("decode-worker".into())
            .spawn(move || {
                let _guard = span.enter();
                info!("Decode worker starting...");
                worker.run(jobs_rx, control_rx);
                let _ = done_tx.send(());
                info!("Decode worker exiting...");
            })
            .map_err(Error::WorkerSpawn)?;

        Ok(Self {
            jobs: jobs_tx,
            control: control_tx,
            done: done_rx,
            handle: Some(handle),
            quit_sent: false,
        })
    }

    /// Destination for frame requests
    pub fn job_sender(&self) -> Sender<DecodeJob> {
        self.jobs.clone()
    }

    /// Ask the run loop to drain and exit. Repeated calls are no-ops.
    pub fn quit(&mut self) {
        if self.quit_sent {
            return;
        }
        self.quit_sent = true;
        let _ = self.control.send(WorkerControl::Quit);
    }

    /// Wait up to `timeout` for the run loop to finish. Returns false on timeout.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("Decode worker panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        // Detached if still busy; the loop exits after its current job
        self.quit();
    }
}

impl WorkerLoop {
    fn run(mut self, jobs: Receiver<DecodeJob>, control: Receiver<WorkerControl>) {
        loop {
            select! {
                recv(control) -> msg => match msg {
                    Ok(WorkerControl::Quit) | Err(_) => break,
                },
                recv(jobs) -> job => match job {
                    Ok(job) => self.accept(job),
                    Err(_) => break,
                },
            }
        }

        let drained = jobs.try_iter().count();
        if drained > 0 {
            debug!("Discarded {} queued decode jobs", drained);
        }
    }

    fn accept(&mut self, job: DecodeJob) {
        if job.kind == JobKind::Continuous && !self.latch.try_acquire() {
            debug!("Continuous decode already pending, dropping frame");
            return;
        }

        let kind = job.kind;
        let outcome = self.process(job);
        self.recognizer.clear();

        if self
            .controller
            .send(ControllerMessage::Decoded { kind, outcome })
            .is_err()
        {
            debug!("Controller gone, outcome discarded");
            if kind == JobKind::Continuous {
                self.latch.release();
            }
        }
    }

    fn process(&mut self, job: DecodeJob) -> DecodeOutcome {
        let start = Instant::now();
        let failed = |start: Instant| {
            DecodeOutcome::Failed(OcrFailure {
                time_required: start.elapsed(),
            })
        };

        let image = match apply_preprocessing(&job.frame, job.region, &self.preprocess) {
            Ok(image) => image,
            Err(e) => {
                warn!("Frame not decodable: {}", e);
                return failed(start);
            }
        };

        match vision::recognize(&mut self.recognizer, image, &self.recognition) {
            Ok(Some(result)) => DecodeOutcome::Recognized(result),
            Ok(None) => failed(start),
            Err(e) => {
                error!("Recognition fault: {}", e);
                // Sent ahead of the outcome so the controller never re-arms
                let _ = self
                    .controller
                    .send(ControllerMessage::StopRequested(e.to_string()));
                failed(start)
            }
        }
    }
}
