//! Capture Layer
//!
//! `FrameSource` owns the capture device handle. The device streams preview
//! frames continuously, but only a frame explicitly requested with
//! [`FrameSource::request_frame`] is ever forwarded; everything else is
//! dropped in the device callback. Every operation serializes on one lock.

pub mod configuration;
pub mod focus;
pub mod frame;
pub mod geometry;
pub mod replay;

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::{CaptureSettings, RegionSettings};
use crate::error::{Error, Result};
use crate::pipeline::messages::{DecodeJob, JobKind};

use self::configuration::{DeviceCapabilities, DeviceConfiguration, DeviceSettings};
use self::focus::FocusManager;
use self::frame::Frame;
use self::geometry::{project_to_capture, FrameGeometry, Rect, Size};

pub use self::replay::ReplayDriver;

/// Invoked by the device for every preview frame with `(data, width, height)`.
///
/// The buffer is only valid for the duration of the call.
pub type PreviewCallback = Arc<dyn Fn(&[u8], u32, u32) + Send + Sync>;

/// The surface the live preview is shown on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTarget {
    pub size: Size,
}

impl DisplayTarget {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            size: Size::new(width, height),
        }
    }
}

/// An open capture device.
///
/// Implementations must not invoke the preview callback synchronously from
/// within `start_preview`.
pub trait CaptureDevice: Send {
    /// Supported sizes and modes, or `None` if the device cannot report them
    fn capabilities(&self) -> Option<DeviceCapabilities>;

    /// Attach the preview output to a display surface
    fn bind_display(&mut self, display: &DisplayTarget) -> Result<()>;

    /// Push preview size, focus and flash settings
    fn apply_settings(&mut self, settings: &DeviceSettings) -> Result<()>;

    /// Start streaming frames into `callback`
    fn start_preview(&mut self, callback: PreviewCallback) -> Result<()>;

    /// Stop streaming
    fn stop_preview(&mut self);

    /// Run one focus pass
    fn auto_focus(&mut self) -> Result<()>;

    /// Give the hardware back
    fn release(&mut self);
}

/// Acquires capture devices
pub trait CaptureDriver: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>>;
}

/// One armed frame delivery
struct FrameRequest {
    destination: Sender<DecodeJob>,
    kind: JobKind,
}

struct Inner {
    driver: Arc<dyn CaptureDriver>,
    settings: CaptureSettings,
    geometry: FrameGeometry,
    device: Option<Box<dyn CaptureDevice>>,
    capabilities: DeviceCapabilities,
    configuration: DeviceConfiguration,
    initialized: bool,
    previewing: bool,
    torch: bool,
    pending_adjustment: Option<(i32, i32)>,
    framing_rect: Option<Rect>,
    framing_rect_in_capture: Option<Rect>,
    request: Option<FrameRequest>,
    focus: Option<FocusManager>,
}

impl Inner {
    /// Region in visible coordinates, computed lazily while the device is open
    fn framing_rect(&mut self) -> Option<Rect> {
        if self.framing_rect.is_none() {
            self.device.as_ref()?;
            let visible = self.configuration.visible_resolution()?;
            self.framing_rect = Some(self.geometry.default_region(visible));
        }
        self.framing_rect
    }

    /// Region in capture coordinates, cached until the region or device changes
    fn framing_rect_in_capture(&mut self) -> Option<Rect> {
        if self.framing_rect_in_capture.is_none() {
            let rect = self.framing_rect()?;
            let visible = self.configuration.visible_resolution()?;
            let capture = self.configuration.capture_resolution()?;
            self.framing_rect_in_capture = project_to_capture(rect, visible, capture);
        }
        self.framing_rect_in_capture
    }

    fn adjust(&mut self, delta_width: i32, delta_height: i32) {
        let Some(visible) = self.configuration.visible_resolution() else {
            self.pending_adjustment = Some((delta_width, delta_height));
            return;
        };
        let current = self
            .framing_rect
            .unwrap_or_else(|| self.geometry.default_region(visible));
        self.framing_rect = Some(self.geometry.adjust(current, delta_width, delta_height, visible));
        self.framing_rect_in_capture = None;
    }

    fn apply_device_settings(&mut self) {
        let mut settings = self.settings.clone();
        settings.torch = self.torch;
        let Some(desired) = self.configuration.desired_settings(&self.capabilities, &settings) else {
            return;
        };
        if let Some(device) = self.device.as_mut() {
            if let Err(e) = device.apply_settings(&desired) {
                warn!("Could not apply device settings: {}", e);
            }
        }
    }

    fn stop_focus(&mut self) {
        if let Some(focus) = self.focus.take() {
            focus.stop();
        }
    }
}

/// Thread-safe owner of the capture device
#[derive(Clone)]
pub struct FrameSource {
    inner: Arc<Mutex<Inner>>,
}

impl FrameSource {
    /// Create a frame source over the given driver. No device is opened yet.
    pub fn new(driver: Arc<dyn CaptureDriver>, settings: CaptureSettings, region: RegionSettings) -> Self {
        let torch = settings.torch;
        Self {
            inner: Arc::new(Mutex::new(Inner {
                driver,
                settings,
                geometry: FrameGeometry::new(region),
                device: None,
                capabilities: DeviceCapabilities::default(),
                configuration: DeviceConfiguration::default(),
                initialized: false,
                previewing: false,
                torch,
                pending_adjustment: None,
                framing_rect: None,
                framing_rect_in_capture: None,
                request: None,
                focus: None,
            })),
        }
    }

    /// Acquire the device and bind it to `display`. Re-binds if already open.
    pub fn open(&self, display: &DisplayTarget) -> Result<()> {
        let mut inner = self.inner.lock();

        let newly_opened = inner.device.is_none();
        if newly_opened {
            let device = inner
                .driver
                .open()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
            inner.device = Some(device);
        }

        let bound = match inner.device.as_mut() {
            Some(device) => device.bind_display(display),
            None => Err(Error::DeviceUnavailable("device handle missing".into())),
        };
        if let Err(e) = bound {
            if newly_opened {
                if let Some(mut device) = inner.device.take() {
                    device.release();
                }
            }
            return Err(Error::DeviceUnavailable(format!("cannot bind display: {}", e)));
        }

        match inner.device.as_ref().and_then(|d| d.capabilities()) {
            Some(caps) => inner.capabilities = caps,
            None => {
                warn!("Device error: no capabilities are available. Proceeding without configuration.");
                inner.capabilities = DeviceCapabilities::default();
            }
        }

        if !inner.initialized {
            inner.initialized = true;
            let Inner {
                capabilities,
                configuration,
                settings,
                ..
            } = &mut *inner;
            configuration.init_from_capabilities(capabilities, display.size, settings);

            if let Some((dw, dh)) = inner.pending_adjustment.take() {
                if dw != 0 || dh != 0 {
                    debug!("Applying region adjustment requested before configuration: ({}, {})", dw, dh);
                    inner.adjust(dw, dh);
                }
            }
        }

        inner.apply_device_settings();
        info!("Capture device open");
        Ok(())
    }

    /// Release the device. Region state is resolution-dependent and is dropped too.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.stop_focus();
        inner.request = None;
        if let Some(mut device) = inner.device.take() {
            if inner.previewing {
                device.stop_preview();
                inner.previewing = false;
            }
            device.release();
            inner.framing_rect = None;
            inner.framing_rect_in_capture = None;
            info!("Capture device closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().device.is_some()
    }

    pub fn is_previewing(&self) -> bool {
        self.inner.lock().previewing
    }

    /// Start streaming. No-op if not open or already previewing.
    pub fn start_preview(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.previewing {
            return Ok(());
        }
        let Some(device) = inner.device.as_mut() else {
            return Ok(());
        };

        let weak = Arc::downgrade(&self.inner);
        let callback: PreviewCallback = Arc::new(move |data: &[u8], width: u32, height: u32| {
            on_preview_frame(&weak, data, width, height);
        });
        device.start_preview(callback)?;
        inner.previewing = true;

        let interval = inner
            .configuration
            .desired_settings(&inner.capabilities, &inner.settings)
            .and_then(|s| s.focus_mode)
            .filter(|mode| inner.settings.auto_focus && mode.needs_trigger())
            .map(|_| inner.settings.focus_interval());

        let weak = Arc::downgrade(&self.inner);
        inner.focus = Some(FocusManager::start(interval, move || focus_device(&weak)));
        debug!("Preview started");
        Ok(())
    }

    /// Stop streaming, cancel focus activity and any armed frame request
    pub fn stop_preview(&self) {
        let mut inner = self.inner.lock();
        inner.stop_focus();
        if !inner.previewing {
            return;
        }
        if let Some(device) = inner.device.as_mut() {
            device.stop_preview();
        }
        inner.request = None;
        inner.previewing = false;
        debug!("Preview stopped");
    }

    /// Forward the next preview frame to `destination`, tagged with `kind`.
    ///
    /// Ignored unless previewing. Re-arming before the frame arrives replaces
    /// the earlier request.
    pub fn request_frame(&self, destination: Sender<DecodeJob>, kind: JobKind) {
        let mut inner = self.inner.lock();
        if inner.device.is_none() || !inner.previewing {
            debug!("Frame request ignored while not previewing");
            return;
        }
        inner.request = Some(FrameRequest { destination, kind });
    }

    /// Drop the armed frame request, if any
    pub fn cancel_request(&self) {
        self.inner.lock().request = None;
    }

    pub fn has_pending_request(&self) -> bool {
        self.inner.lock().request.is_some()
    }

    /// Best-effort focus after `delay`
    pub fn request_auto_focus(&self, delay: Duration) {
        let inner = self.inner.lock();
        match inner.focus.as_ref() {
            Some(focus) => focus.request(delay),
            None => debug!("Auto focus requested while not previewing"),
        }
    }

    /// Switch the torch; failures are logged
    pub fn set_torch(&self, on: bool) {
        let mut inner = self.inner.lock();
        inner.torch = on;
        inner.apply_device_settings();
    }

    /// Region of interest in visible coordinates
    pub fn current_region(&self) -> Option<Rect> {
        self.inner.lock().framing_rect()
    }

    /// Region of interest in capture coordinates
    pub fn capture_region(&self) -> Option<Rect> {
        self.inner.lock().framing_rect_in_capture()
    }

    /// Resize the region of interest. Before the device is configured the
    /// deltas are remembered and applied on open.
    pub fn adjust_region(&self, delta_width: i32, delta_height: i32) {
        let mut inner = self.inner.lock();
        if inner.initialized {
            inner.adjust(delta_width, delta_height);
        } else {
            let (dw, dh) = inner.pending_adjustment.unwrap_or((0, 0));
            inner.pending_adjustment =
                Some((dw.saturating_add(delta_width), dh.saturating_add(delta_height)));
        }
    }

    pub fn visible_resolution(&self) -> Option<Size> {
        self.inner.lock().configuration.visible_resolution()
    }

    pub fn capture_resolution(&self) -> Option<Size> {
        self.inner.lock().configuration.capture_resolution()
    }
}

/// Device-callback path: forward the frame only if a request is armed
fn on_preview_frame(inner: &Weak<Mutex<Inner>>, data: &[u8], width: u32, height: u32) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let (request, region, reversed) = {
        let mut inner = inner.lock();
        if !inner.previewing {
            return;
        }
        let Some(request) = inner.request.take() else {
            trace!("Dropping unrequested frame");
            return;
        };
        let region = inner.framing_rect_in_capture();
        (request, region, inner.settings.reverse_image)
    };

    let job = DecodeJob {
        frame: Frame::from_buffer(data, width, height, reversed),
        region,
        kind: request.kind,
    };

    match request.destination.try_send(job) {
        Ok(()) => trace!("Forwarded {}x{} frame as {:?} job", width, height, request.kind),
        Err(TrySendError::Full(_)) => debug!("Decode slot occupied, dropping frame"),
        Err(TrySendError::Disconnected(_)) => debug!("Decode worker gone, dropping frame"),
    }
}

fn focus_device(inner: &Weak<Mutex<Inner>>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = inner.lock();
    if !inner.previewing {
        return;
    }
    if let Some(device) = inner.device.as_mut() {
        if let Err(e) = device.auto_focus() {
            warn!("Auto focus failed: {}", e);
        }
    }
}
