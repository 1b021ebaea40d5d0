//! Frame data structures for captured preview content

use std::time::Instant;

use super::geometry::Size;

/// A frame captured from the preview stream.
///
/// The data is a copy of the device's planar luma/chroma buffer; the first
/// `width * height` bytes are the luminance plane.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in the device's native layout
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Whether the device reports a mirrored image
    pub reversed: bool,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Copy a device buffer into a new frame
    pub fn from_buffer(buffer: &[u8], width: u32, height: u32, reversed: bool) -> Self {
        Self {
            data: buffer.to_vec(),
            width,
            height,
            reversed,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// The luminance plane, if the buffer is long enough to hold one
    pub fn luma(&self) -> Option<&[u8]> {
        let len = self.width as usize * self.height as usize;
        self.data.get(..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_plane() {
        // 2x2 luma followed by one interleaved chroma row
        let frame = Frame::from_buffer(&[1, 2, 3, 4, 128, 128], 2, 2, false);
        assert_eq!(frame.luma(), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(frame.size(), Size::new(2, 2));
    }

    #[test]
    fn test_short_buffer_has_no_luma() {
        let frame = Frame::from_buffer(&[1, 2, 3], 2, 2, false);
        assert!(frame.luma().is_none());
    }
}
