//! Pipeline error types
//!
//! Only `DeviceUnavailable` and `RecognitionFault` are ever surfaced to the
//! user. Everything else is absorbed by the pipeline and turned into a state
//! transition or a silent re-arm.

/// Errors produced by the capture and decode pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No capture device could be acquired, or the display target could not be bound
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A driver call failed on an already open device
    #[error("capture device error: {0}")]
    Device(String),

    /// The recognition engine faulted; the session should stop
    #[error("recognition engine fault: {0}")]
    RecognitionFault(String),

    /// A frame could not be cropped or converted for recognition
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The decode worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Image decoding or encoding failed
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// File system I/O failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::DeviceUnavailable("camera busy".into());
        assert_eq!(err.to_string(), "capture device unavailable: camera busy");

        let err = Error::WorkerSpawn(std::io::Error::other("no threads"));
        assert_eq!(err.to_string(), "failed to spawn worker thread: no threads");
    }
}
