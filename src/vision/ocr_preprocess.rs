//! Image preprocessing before recognition
//!
//! Crops the region of interest out of the frame's luminance plane and
//! binarizes it with a tiled Otsu threshold so uneven lighting across the
//! document does not wash out characters.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use tracing::debug;

use crate::capture::frame::Frame;
use crate::capture::geometry::Rect;
use crate::config::PreprocessSettings;
use crate::error::{Error, Result};

/// Crop, greyscale and (optionally) binarize a frame for recognition
pub fn apply_preprocessing(
    frame: &Frame,
    region: Option<Rect>,
    settings: &PreprocessSettings,
) -> Result<GrayImage> {
    let region =
        region.ok_or_else(|| Error::InvalidFrame("region of interest not configured".into()))?;
    let cropped = crop_luminance(frame, region)?;

    if !settings.binarize {
        debug!("Binarization disabled");
        return Ok(cropped);
    }

    let binarized = otsu_adaptive_threshold(&cropped, settings);
    debug!(
        "Thresholding completed, image size: {}x{}",
        binarized.width(),
        binarized.height()
    );
    Ok(binarized)
}

/// Copy the region out of the luminance plane, mirroring rows for reversed frames
pub fn crop_luminance(frame: &Frame, region: Rect) -> Result<GrayImage> {
    let luma = frame.luma().ok_or_else(|| {
        Error::InvalidFrame(format!(
            "buffer of {} bytes is too short for a {}x{} frame",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;

    if !region.fits_within(frame.size()) {
        return Err(Error::InvalidFrame(format!(
            "crop rectangle {:?} does not fit within {}x{} image data",
            region, frame.width, frame.height
        )));
    }

    let width = region.width() as usize;
    let height = region.height() as usize;
    let stride = frame.width as usize;
    let mut pixels = Vec::with_capacity(width * height);

    for row in region.top as usize..region.bottom as usize {
        let start = row * stride + region.left as usize;
        let line = &luma[start..start + width];
        if frame.reversed {
            pixels.extend(line.iter().rev());
        } else {
            pixels.extend_from_slice(line);
        }
    }

    GrayImage::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| Error::InvalidFrame("cropped buffer size mismatch".into()))
}

/// Binarize with one Otsu threshold per tile, smoothed over neighbouring tiles.
///
/// Pixels at or below their tile's threshold become 0, the rest 255.
pub fn otsu_adaptive_threshold(image: &GrayImage, settings: &PreprocessSettings) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tile_w = settings.tile_width.clamp(1, width);
    let tile_h = settings.tile_height.clamp(1, height);
    let tiles_x = width.div_ceil(tile_w) as usize;
    let tiles_y = height.div_ceil(tile_h) as usize;

    let mut levels = vec![0u8; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx as u32 * tile_w;
            let y0 = ty as u32 * tile_h;
            let tile = image::imageops::crop_imm(
                image,
                x0,
                y0,
                tile_w.min(width - x0),
                tile_h.min(height - y0),
            )
            .to_image();
            levels[ty * tiles_x + tx] = otsu_level(&tile);
        }
    }

    let levels = smooth_levels(&levels, tiles_x, tiles_y, settings.smooth_x, settings.smooth_y);

    GrayImage::from_fn(width, height, |x, y| {
        let level = levels[(y / tile_h) as usize * tiles_x + (x / tile_w) as usize];
        if image.get_pixel(x, y)[0] <= level {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Box-average the tile thresholds over `(2*sx+1) x (2*sy+1)` neighbourhoods
fn smooth_levels(levels: &[u8], tiles_x: usize, tiles_y: usize, sx: u32, sy: u32) -> Vec<u8> {
    if sx == 0 && sy == 0 {
        return levels.to_vec();
    }
    let (sx, sy) = (sx as usize, sy as usize);

    let mut smoothed = Vec::with_capacity(levels.len());
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (mut sum, mut count) = (0u32, 0u32);
            for ny in ty.saturating_sub(sy)..=(ty + sy).min(tiles_y - 1) {
                for nx in tx.saturating_sub(sx)..=(tx + sx).min(tiles_x - 1) {
                    sum += levels[ny * tiles_x + nx] as u32;
                    count += 1;
                }
            }
            smoothed.push((sum / count) as u8);
        }
    }
    smoothed
}
