//! Capture device configuration
//!
//! Picks the preview resolution, focus mode and flash mode from what the
//! device reports, and remembers the visible and capture resolutions the
//! region of interest is computed against.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::geometry::Size;
use crate::config::CaptureSettings;

/// Focus modes a device may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    Auto,
    ContinuousVideo,
    ContinuousPicture,
    Macro,
    Edof,
    Fixed,
    Infinity,
}

impl FocusMode {
    /// Whether the device only focuses when explicitly asked to
    pub fn needs_trigger(self) -> bool {
        matches!(self, FocusMode::Auto | FocusMode::Macro)
    }
}

/// Flash modes a device may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlashMode {
    Off,
    On,
    Torch,
}

/// What a device reports it can do
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub preview_sizes: Vec<Size>,
    pub default_preview_size: Option<Size>,
    pub focus_modes: Vec<FocusMode>,
    pub flash_modes: Vec<FlashMode>,
}

/// Settings pushed to the device after opening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    pub preview_size: Size,
    pub focus_mode: Option<FocusMode>,
    pub flash_mode: Option<FlashMode>,
}

/// Resolutions resolved during the first configuration pass
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConfiguration {
    visible: Option<Size>,
    capture: Option<Size>,
}

impl DeviceConfiguration {
    /// Record the visible resolution and pick a capture resolution for it
    pub fn init_from_capabilities(
        &mut self,
        caps: &DeviceCapabilities,
        display: Size,
        settings: &CaptureSettings,
    ) {
        if display.width < display.height {
            info!("Display reports portrait orientation; assuming this is incorrect");
        }
        let visible = display.landscape();
        info!("Visible resolution: {}", visible);

        let capture = best_preview_size(caps, visible, settings);
        match capture {
            Some(size) => info!("Capture resolution: {}", size),
            None => warn!("Device reported no usable preview size"),
        }

        self.visible = Some(visible);
        self.capture = capture;
    }

    pub fn visible_resolution(&self) -> Option<Size> {
        self.visible
    }

    pub fn capture_resolution(&self) -> Option<Size> {
        self.capture
    }

    /// Settings to apply to the device, or `None` before the first pass
    pub fn desired_settings(
        &self,
        caps: &DeviceCapabilities,
        settings: &CaptureSettings,
    ) -> Option<DeviceSettings> {
        let preview_size = self.capture?;
        Some(DeviceSettings {
            preview_size,
            focus_mode: choose_focus_mode(&caps.focus_modes, settings),
            flash_mode: choose_flash_mode(&caps.flash_modes, settings.torch),
        })
    }
}

/// Pick the preview size closest to the visible aspect ratio within the pixel budget
pub fn best_preview_size(
    caps: &DeviceCapabilities,
    visible: Size,
    settings: &CaptureSettings,
) -> Option<Size> {
    let mut sizes = caps.preview_sizes.clone();
    sizes.sort_by(|a, b| b.area().cmp(&a.area()));

    debug!(
        "Supported preview sizes: {}",
        sizes.iter().map(Size::to_string).collect::<Vec<_>>().join(" ")
    );

    let visible_ratio = visible.width as f32 / visible.height.max(1) as f32;
    let mut best: Option<Size> = None;
    let mut best_diff = f32::INFINITY;

    for size in sizes {
        let pixels = size.area();
        if pixels < settings.min_preview_pixels as u64 || pixels > settings.max_preview_pixels as u64 {
            continue;
        }

        let flipped = size.landscape();
        if flipped == visible {
            info!("Found preview size exactly matching visible size: {}", size);
            return Some(size);
        }

        let ratio = flipped.width as f32 / flipped.height.max(1) as f32;
        let diff = (ratio - visible_ratio).abs();
        if diff < best_diff {
            best = Some(size);
            best_diff = diff;
        }
    }

    if best.is_none() {
        if let Some(default) = caps.default_preview_size {
            info!("No suitable preview sizes, using default: {}", default);
            return Some(default);
        }
    }

    best
}

/// Pick the focus mode for the configured focus preferences
pub fn choose_focus_mode(supported: &[FocusMode], settings: &CaptureSettings) -> Option<FocusMode> {
    let mut mode = None;
    if settings.auto_focus {
        mode = if settings.disable_continuous_focus {
            first_supported(supported, &[FocusMode::Auto])
        } else {
            first_supported(
                supported,
                &[FocusMode::ContinuousVideo, FocusMode::ContinuousPicture, FocusMode::Auto],
            )
        };
    }

    mode.or_else(|| first_supported(supported, &[FocusMode::Macro, FocusMode::Edof]))
}

/// Pick the flash mode for the torch setting
pub fn choose_flash_mode(supported: &[FlashMode], torch: bool) -> Option<FlashMode> {
    if torch {
        first_supported(supported, &[FlashMode::Torch, FlashMode::On])
    } else {
        first_supported(supported, &[FlashMode::Off])
    }
}

fn first_supported<T: Copy + PartialEq + std::fmt::Debug>(supported: &[T], desired: &[T]) -> Option<T> {
    let result = desired.iter().copied().find(|d| supported.contains(d));
    debug!("Supported values: {:?}, settable value: {:?}", supported, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(sizes: &[(u32, u32)]) -> DeviceCapabilities {
        DeviceCapabilities {
            preview_sizes: sizes.iter().map(|&(w, h)| Size::new(w, h)).collect(),
            default_preview_size: Some(Size::new(320, 240)),
            focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousPicture, FocusMode::Macro],
            flash_modes: vec![FlashMode::Off, FlashMode::Torch],
        }
    }

    #[test]
    fn test_exact_match_wins() {
        let caps = caps(&[(1280, 720), (960, 720), (720, 480)]);
        let size = best_preview_size(&caps, Size::new(960, 720), &CaptureSettings::default());
        assert_eq!(size, Some(Size::new(960, 720)));
    }

    #[test]
    fn test_closest_aspect_ratio() {
        let caps = caps(&[(1280, 960), (1024, 576), (640, 480)]);
        let size = best_preview_size(&caps, Size::new(1920, 1080), &CaptureSettings::default());
        assert_eq!(size, Some(Size::new(1024, 576)));
    }

    #[test]
    fn test_pixel_budget_falls_back_to_default() {
        let caps = caps(&[(1920, 1080), (176, 144)]);
        let size = best_preview_size(&caps, Size::new(1280, 720), &CaptureSettings::default());
        assert_eq!(size, Some(Size::new(320, 240)));
    }

    #[test]
    fn test_portrait_display_is_swapped() {
        let caps = caps(&[(1280, 720)]);
        let mut config = DeviceConfiguration::default();
        config.init_from_capabilities(&caps, Size::new(720, 1280), &CaptureSettings::default());
        assert_eq!(config.visible_resolution(), Some(Size::new(1280, 720)));
        assert_eq!(config.capture_resolution(), Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_focus_mode_selection() {
        let supported = [FocusMode::Auto, FocusMode::ContinuousPicture, FocusMode::Macro];
        let mut settings = CaptureSettings::default();

        assert_eq!(choose_focus_mode(&supported, &settings), Some(FocusMode::Auto));

        settings.disable_continuous_focus = false;
        assert_eq!(choose_focus_mode(&supported, &settings), Some(FocusMode::ContinuousPicture));

        settings.auto_focus = false;
        assert_eq!(choose_focus_mode(&supported, &settings), Some(FocusMode::Macro));

        assert_eq!(choose_focus_mode(&[FocusMode::Fixed], &settings), None);
    }

    #[test]
    fn test_flash_mode_selection() {
        assert_eq!(choose_flash_mode(&[FlashMode::Off, FlashMode::On], true), Some(FlashMode::On));
        assert_eq!(choose_flash_mode(&[FlashMode::Off, FlashMode::Torch], false), Some(FlashMode::Off));
        assert_eq!(choose_flash_mode(&[], true), None);
    }

    #[test]
    fn test_desired_settings_need_first_pass() {
        let caps = caps(&[(1280, 720)]);
        let settings = CaptureSettings::default();
        let mut config = DeviceConfiguration::default();
        assert!(config.desired_settings(&caps, &settings).is_none());

        config.init_from_capabilities(&caps, Size::new(1280, 720), &settings);
        let desired = config.desired_settings(&caps, &settings).unwrap();
        assert_eq!(desired.preview_size, Size::new(1280, 720));
        assert_eq!(desired.flash_mode, Some(FlashMode::Torch));
    }
}
