//! Vision/OCR Layer
//!
//! Prepares frames for recognition and collects text, confidences and
//! geometry from a [`Recognizer`].

pub mod ocr;
pub mod ocr_preprocess;
pub mod scripted;

pub use ocr::{OcrFailure, OcrResult, Recognizer};
pub use ocr_preprocess::apply_preprocessing;
pub use scripted::{ScriptedRecognizer, ScriptedResult};

use image::GrayImage;
use std::time::Instant;
use tracing::debug;

use crate::config::RecognitionSettings;
use crate::error::Result;

/// Run the recognizer over a prepared image.
///
/// Returns `Ok(None)` when no text was found and `Err` when the engine
/// faulted. The caller is responsible for clearing the recognizer.
pub fn recognize<R: Recognizer + ?Sized>(
    recognizer: &mut R,
    image: GrayImage,
    settings: &RecognitionSettings,
) -> Result<Option<OcrResult>> {
    let start = Instant::now();

    recognizer.set_image(&image)?;
    let text = match recognizer.text()? {
        Some(text) if !text.is_empty() => text,
        _ => {
            debug!("No text recognized in {:?}", start.elapsed());
            return Ok(None);
        }
    };

    let word_confidences = recognizer.word_confidences()?;
    let mean_confidence = recognizer.mean_confidence()?;
    let region_boxes = settings.region_boxes.then(|| recognizer.regions()).transpose()?;
    let textline_boxes = settings.textline_boxes.then(|| recognizer.textlines()).transpose()?;
    let strip_boxes = settings.strip_boxes.then(|| recognizer.strips()).transpose()?;
    let word_boxes = recognizer.words()?;

    let time_required = start.elapsed();
    debug!(
        "Recognized {} chars at mean confidence {} in {:?}",
        text.len(),
        mean_confidence,
        time_required
    );

    Ok(Some(OcrResult {
        text,
        word_confidences,
        mean_confidence,
        time_required,
        region_boxes,
        textline_boxes,
        strip_boxes,
        word_boxes,
        image,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::geometry::Rect;
    use crate::error::Error;

    struct BoxedRecognizer {
        inner: ScriptedRecognizer,
    }

    impl Recognizer for BoxedRecognizer {
        fn set_image(&mut self, image: &GrayImage) -> Result<()> {
            self.inner.set_image(image)
        }
        fn text(&mut self) -> Result<Option<String>> {
            self.inner.text()
        }
        fn word_confidences(&mut self) -> Result<Vec<u8>> {
            self.inner.word_confidences()
        }
        fn mean_confidence(&mut self) -> Result<u8> {
            self.inner.mean_confidence()
        }
        fn textlines(&mut self) -> Result<Vec<Rect>> {
            Ok(vec![Rect::new(0, 0, 10, 2)])
        }
        fn words(&mut self) -> Result<Vec<Rect>> {
            Ok(vec![Rect::new(0, 0, 4, 2), Rect::new(5, 0, 10, 2)])
        }
        fn clear(&mut self) {
            self.inner.clear()
        }
    }

    #[test]
    fn test_recognize_collects_requested_geometry() {
        let mut recognizer = BoxedRecognizer {
            inner: ScriptedRecognizer::new(vec![ScriptedResult::text("AB CD", 88)]),
        };
        let settings = RecognitionSettings {
            textline_boxes: true,
            ..Default::default()
        };

        let result = recognize(&mut recognizer, GrayImage::new(10, 2), &settings)
            .unwrap()
            .unwrap();
        assert_eq!(result.text, "AB CD");
        assert_eq!(result.mean_confidence, 88);
        assert_eq!(result.word_confidences, vec![88, 88]);
        assert_eq!(result.textline_boxes.as_ref().map(Vec::len), Some(1));
        assert!(result.region_boxes.is_none());
        assert!(result.strip_boxes.is_none());
        assert_eq!(result.word_boxes.len(), 2);
    }

    #[test]
    fn test_recognize_empty_text() {
        let mut recognizer = ScriptedRecognizer::new(vec![ScriptedResult::text("", 0)]);
        let result = recognize(&mut recognizer, GrayImage::new(1, 1), &RecognitionSettings::default());
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_recognize_fault() {
        let mut recognizer = ScriptedRecognizer::new(vec![ScriptedResult::fault("bad image")]);
        let result = recognize(&mut recognizer, GrayImage::new(1, 1), &RecognitionSettings::default());
        assert!(matches!(result, Err(Error::RecognitionFault(_))));
    }
}
