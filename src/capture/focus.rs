//! Background focus management
//!
//! Focus is best-effort: the manager runs on its own thread, triggers focus
//! after a requested delay or on a fixed cycle, and never reports failures
//! back to the caller.

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Schedules focus passes on a background thread
pub struct FocusManager {
    requests: Sender<Duration>,
}

impl FocusManager {
    /// Start the manager. With an `interval`, focus is re-triggered on that cycle.
    ///
    /// The `focus` callback runs on the manager thread and must do its own
    /// error reporting.
    pub fn start<F>(interval: Option<Duration>, focus: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (requests, rx) = unbounded::<Duration>();
        let span = tracing::Span::current();

        let spawned = std::thread::Builder::new()
            .name("focus-manager".into())
            .spawn(move || {
                let _guard = span.enter();
                let mut next = interval.map(|i| Instant::now() + i);
                loop {
                    let msg = match next {
                        Some(deadline) => rx.recv_deadline(deadline),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match msg {
                        Ok(delay) => next = Some(Instant::now() + delay),
                        Err(RecvTimeoutError::Timeout) => {
                            focus();
                            next = interval.map(|i| Instant::now() + i);
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Focus manager exiting");
            });

        if let Err(e) = spawned {
            warn!("Could not start focus manager: {}", e);
        }

        Self { requests }
    }

    /// Focus once after `delay`, replacing any pending pass
    pub fn request(&self, delay: Duration) {
        if self.requests.send(delay).is_err() {
            debug!("Focus request after manager exit ignored");
        }
    }

    /// Cancel pending focus activity. The thread exits at its next wake-up.
    pub fn stop(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_requested_focus_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let manager = FocusManager::start(None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.request(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        manager.stop();
    }

    #[test]
    fn test_stop_cancels_pending_focus() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let manager = FocusManager::start(None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.request(Duration::from_millis(150));
        manager.stop();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_periodic_focus() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let manager = FocusManager::start(Some(Duration::from_millis(20)), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(300));
        manager.stop();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
