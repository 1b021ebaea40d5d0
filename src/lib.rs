//! mrz-capture - Live capture and decoding of machine readable zones
//!
//! Frames from a capture device are handed one at a time to a recognition
//! worker; a controller paces the scan, pauses and resumes it, and finishes
//! the session once a zone passes check digit validation.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod mrz;
pub mod pipeline;
pub mod vision;

pub use app::ScanSession;
pub use error::{Error, Result};
