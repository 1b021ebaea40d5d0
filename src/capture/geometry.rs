//! Region-of-interest geometry
//!
//! Pure computations over the framing rectangle: the default centered region,
//! drag adjustments clamped to the visible bounds, and projection from visible
//! preview coordinates into raw capture coordinates.

use serde::{Deserialize, Serialize};

use crate::config::RegionSettings;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The same size with width >= height
    pub fn landscape(self) -> Self {
        if self.width < self.height {
            Self::new(self.height, self.width)
        } else {
            self
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle; `right` and `bottom` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// A rectangle of the given size centered inside `bounds`
    fn centered(width: i32, height: i32, bounds: Size) -> Self {
        let left = (bounds.width as i32 - width) / 2;
        let top = (bounds.height as i32 - height) / 2;
        Self::new(left, top, left + width, top + height)
    }

    /// Whether the rectangle lies entirely inside a `size`-sized image
    pub fn fits_within(&self, size: Size) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.width() > 0
            && self.height() > 0
            && self.right <= size.width as i32
            && self.bottom <= size.height as i32
    }
}

/// Computes and adjusts the framing rectangle
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameGeometry {
    limits: RegionSettings,
}

impl FrameGeometry {
    pub fn new(limits: RegionSettings) -> Self {
        Self { limits }
    }

    /// Full visible width, a quarter of the visible height, centered on both axes
    pub fn default_region(&self, visible: Size) -> Rect {
        let width = (visible.width as i32).max(self.limits.min_width);
        let height = (visible.height as i32 / 4).max(self.limits.min_height);
        Rect::centered(width, height, visible)
    }

    /// Grow or shrink `current` by the given deltas and re-center it.
    ///
    /// A delta that would push its axis past `visible - edge_margin` or below
    /// the minimum is dropped for this call; the other axis is judged on its own.
    pub fn adjust(&self, current: Rect, delta_width: i32, delta_height: i32, visible: Size) -> Rect {
        let max_width = visible.width as i32 - self.limits.edge_margin;
        let max_height = visible.height as i32 - self.limits.edge_margin;

        let mut width = current.width().saturating_add(delta_width);
        if width > max_width || width < self.limits.min_width {
            width = current.width();
        }

        let mut height = current.height().saturating_add(delta_height);
        if height > max_height || height < self.limits.min_adjusted_height {
            height = current.height();
        }

        Rect::centered(width, height, visible)
    }
}

/// Rescale each edge of a visible-space rectangle into capture space.
///
/// Returns `None` when the visible size is degenerate.
pub fn project_to_capture(region: Rect, visible: Size, capture: Size) -> Option<Rect> {
    if visible.width == 0 || visible.height == 0 {
        return None;
    }

    let scale_x = |v: i32| (v as i64 * capture.width as i64 / visible.width as i64) as i32;
    let scale_y = |v: i32| (v as i64 * capture.height as i64 / visible.height as i64) as i32;

    Some(Rect::new(
        scale_x(region.left),
        scale_y(region.top),
        scale_x(region.right),
        scale_y(region.bottom),
    ))
}
