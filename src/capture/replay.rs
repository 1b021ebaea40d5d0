//! Replay capture device
//!
//! Streams still images from disk as if they came from a camera, looping
//! over them at a fixed frame rate. Frames are emitted in NV21 layout with
//! neutral chroma so they take the same path as live preview buffers.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::configuration::{DeviceCapabilities, DeviceSettings, FlashMode, FocusMode};
use super::geometry::Size;
use super::{CaptureDevice, CaptureDriver, DisplayTarget, PreviewCallback};
use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "tif", "tiff"];

/// Driver handing out devices that replay a fixed set of frames
#[derive(Clone)]
pub struct ReplayDriver {
    frames: Arc<Vec<Vec<u8>>>,
    size: Size,
    frame_interval: Duration,
}

impl ReplayDriver {
    /// Load every image in `dir`, sorted by file name
    pub fn from_dir(dir: &Path, fps: u32) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let images = paths
            .iter()
            .map(|path| Ok(image::open(path)?.to_luma8()))
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded {} replay frames from {}", images.len(), dir.display());
        Self::from_images(images, fps)
    }

    /// Build a driver from decoded images. All frames take the first image's size.
    pub fn from_images(images: Vec<GrayImage>, fps: u32) -> Result<Self> {
        let first = images
            .first()
            .ok_or_else(|| Error::DeviceUnavailable("no replay frames".into()))?;
        let (width, height) = first.dimensions();

        let frames = images
            .iter()
            .map(|img| {
                if img.dimensions() == (width, height) {
                    to_nv21(img)
                } else {
                    let resized = image::imageops::resize(
                        img,
                        width,
                        height,
                        image::imageops::FilterType::Triangle,
                    );
                    to_nv21(&resized)
                }
            })
            .collect();

        Ok(Self {
            frames: Arc::new(frames),
            size: Size::new(width, height),
            frame_interval: Duration::from_millis(1000 / fps.max(1) as u64),
        })
    }

    /// Resolution every replayed frame has
    pub fn frame_size(&self) -> Size {
        self.size
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureDriver for ReplayDriver {
    fn open(&self) -> Result<Box<dyn CaptureDevice>> {
        Ok(Box::new(ReplayDevice {
            frames: self.frames.clone(),
            size: self.size,
            frame_interval: self.frame_interval,
            stop: None,
        }))
    }
}

struct ReplayDevice {
    frames: Arc<Vec<Vec<u8>>>,
    size: Size,
    frame_interval: Duration,
    stop: Option<Sender<()>>,
}

impl CaptureDevice for ReplayDevice {
    fn capabilities(&self) -> Option<DeviceCapabilities> {
        Some(DeviceCapabilities {
            preview_sizes: vec![self.size],
            default_preview_size: Some(self.size),
            focus_modes: vec![FocusMode::Fixed],
            flash_modes: vec![FlashMode::Off],
        })
    }

    fn bind_display(&mut self, target: &DisplayTarget) -> Result<()> {
        debug!("Replay device bound to {} display", target.size);
        Ok(())
    }

    fn apply_settings(&mut self, settings: &DeviceSettings) -> Result<()> {
        if settings.preview_size != self.size {
            return Err(Error::Device(format!(
                "replay frames are {}, cannot preview at {}",
                self.size, settings.preview_size
            )));
        }
        Ok(())
    }

    fn start_preview(&mut self, callback: PreviewCallback) -> Result<()> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let frames = self.frames.clone();
        let interval = self.frame_interval;
        let Size { width, height } = self.size;
        let span = tracing::Span::current();

        std::thread::Builder::new()
            .name("replay-preview".into())
            .spawn(move || {
                let _guard = span.enter();
                let mut index = 0usize;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            callback(&frames[index % frames.len()], width, height);
                            index += 1;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Replay preview thread exiting after {} frames", index);
            })?;

        self.stop = Some(stop_tx);
        Ok(())
    }

    fn stop_preview(&mut self) {
        // Dropping the sender wakes the preview thread; it is not joined so a
        // callback blocked on the frame source lock cannot deadlock us.
        self.stop = None;
    }

    fn auto_focus(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {
        self.stop = None;
    }
}

/// Luma plane followed by a half-height plane of neutral interleaved chroma
fn to_nv21(img: &GrayImage) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let luma_len = width as usize * height as usize;
    let mut data = Vec::with_capacity(luma_len + luma_len / 2);
    data.extend_from_slice(img.as_raw());
    data.resize(luma_len + luma_len / 2, 128);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use image::Luma;

    #[test]
    fn test_to_nv21_layout() {
        let img = GrayImage::from_pixel(4, 2, Luma([200]));
        let data = to_nv21(&img);
        assert_eq!(data.len(), 12);
        assert!(data[..8].iter().all(|&v| v == 200));
        assert!(data[8..].iter().all(|&v| v == 128));
    }

    #[test]
    fn test_from_images_resizes_to_first() {
        let images = vec![
            GrayImage::from_pixel(8, 4, Luma([10])),
            GrayImage::from_pixel(16, 8, Luma([20])),
        ];
        let driver = ReplayDriver::from_images(images, 30).unwrap();
        assert_eq!(driver.frame_size(), Size::new(8, 4));
        assert_eq!(driver.frame_count(), 2);
        assert!(driver.frames.iter().all(|f| f.len() == 48));
    }

    #[test]
    fn test_empty_replay_is_unavailable() {
        let result = ReplayDriver::from_images(vec![], 30);
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }

    #[test]
    fn test_from_dir_loads_sorted_images() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(6, 4, Luma([1])).save(dir.path().join("b.png")).unwrap();
        GrayImage::from_pixel(6, 4, Luma([2])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let driver = ReplayDriver::from_dir(dir.path(), 30).unwrap();
        assert_eq!(driver.frame_count(), 2);
        assert_eq!(driver.frames[0][0], 2);
        assert_eq!(driver.frames[1][0], 1);
    }

    #[test]
    fn test_device_binds_any_display() {
        let driver =
            ReplayDriver::from_images(vec![GrayImage::from_pixel(8, 6, Luma([9]))], 30).unwrap();
        let mut device = driver.open().unwrap();
        assert!(device.bind_display(&DisplayTarget::new(1280, 720)).is_ok());
        assert!(device.bind_display(&DisplayTarget::new(480, 800)).is_ok());

        let caps = device.capabilities().unwrap();
        assert_eq!(caps.default_preview_size, Some(Size::new(8, 6)));
    }

    #[test]
    fn test_device_streams_until_stopped() {
        let driver =
            ReplayDriver::from_images(vec![GrayImage::from_pixel(4, 4, Luma([9]))], 200).unwrap();
        let mut device = driver.open().unwrap();

        let (tx, rx) = unbounded();
        let callback: PreviewCallback = Arc::new(move |data: &[u8], w: u32, h: u32| {
            let _ = tx.send((data.len(), w, h));
        });
        device.start_preview(callback).unwrap();

        let (len, w, h) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((len, w, h), (24, 4, 4));

        device.stop_preview();
        std::thread::sleep(Duration::from_millis(50));
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
    }
}
