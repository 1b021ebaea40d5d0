//! OCR (Optical Character Recognition) capability
//!
//! The recognition engine itself is external; the pipeline only needs an
//! implementation of [`Recognizer`].

use image::GrayImage;
use std::time::Duration;

use crate::capture::geometry::Rect;
use crate::error::Result;

/// A recognition engine that works on one image at a time.
///
/// Any `Err` returned from these methods is treated as a fault that ends the
/// session. `clear` is called after every job, successful or not.
pub trait Recognizer: Send {
    /// Load the image to recognize
    fn set_image(&mut self, image: &GrayImage) -> Result<()>;

    /// Recognized text, `None` if nothing was found
    fn text(&mut self) -> Result<Option<String>>;

    /// Confidence per recognized word (0-100)
    fn word_confidences(&mut self) -> Result<Vec<u8>>;

    /// Mean confidence over the whole image (0-100)
    fn mean_confidence(&mut self) -> Result<u8>;

    /// Page layout regions
    fn regions(&mut self) -> Result<Vec<Rect>> {
        Ok(Vec::new())
    }

    /// Text line boxes
    fn textlines(&mut self) -> Result<Vec<Rect>> {
        Ok(Vec::new())
    }

    /// Text strip boxes
    fn strips(&mut self) -> Result<Vec<Rect>> {
        Ok(Vec::new())
    }

    /// Word boxes
    fn words(&mut self) -> Result<Vec<Rect>>;

    /// Drop the loaded image and any per-image state
    fn clear(&mut self);
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn set_image(&mut self, image: &GrayImage) -> Result<()> {
        (**self).set_image(image)
    }

    fn text(&mut self) -> Result<Option<String>> {
        (**self).text()
    }

    fn word_confidences(&mut self) -> Result<Vec<u8>> {
        (**self).word_confidences()
    }

    fn mean_confidence(&mut self) -> Result<u8> {
        (**self).mean_confidence()
    }

    fn regions(&mut self) -> Result<Vec<Rect>> {
        (**self).regions()
    }

    fn textlines(&mut self) -> Result<Vec<Rect>> {
        (**self).textlines()
    }

    fn strips(&mut self) -> Result<Vec<Rect>> {
        (**self).strips()
    }

    fn words(&mut self) -> Result<Vec<Rect>> {
        (**self).words()
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// Successful recognition of one frame
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Recognized text, lines separated by `\n`
    pub text: String,
    /// Confidence per word (0-100)
    pub word_confidences: Vec<u8>,
    /// Mean confidence (0-100)
    pub mean_confidence: u8,
    /// Time spent in the recognizer
    pub time_required: Duration,
    pub region_boxes: Option<Vec<Rect>>,
    pub textline_boxes: Option<Vec<Rect>>,
    pub strip_boxes: Option<Vec<Rect>>,
    pub word_boxes: Vec<Rect>,
    /// The preprocessed image that was recognized
    pub image: GrayImage,
}

impl OcrResult {
    pub fn image_dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of lines in the text, counting empty ones
    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }
}

/// Recognition of one frame that produced nothing usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrFailure {
    /// Time spent before giving up
    pub time_required: Duration,
}
