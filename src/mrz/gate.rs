//! Decides when a continuous recognition looks complete enough to validate

use tracing::{debug, info};

use super::{MrzPayload, PayloadValidator};
use crate::config::ValidationSettings;
use crate::vision::OcrResult;

pub struct CompletionGate {
    settings: ValidationSettings,
    validator: Box<dyn PayloadValidator>,
}

impl CompletionGate {
    pub fn new(settings: ValidationSettings, validator: Box<dyn PayloadValidator>) -> Self {
        Self { settings, validator }
    }

    /// Keep lines longer than the threshold, with spaces removed, each ending in `\n`
    pub fn filter_lines(&self, text: &str) -> String {
        text.split('\n')
            .filter(|line| line.chars().count() > self.settings.line_length_threshold)
            .map(|line| {
                let mut kept: String = line.chars().filter(|&c| c != ' ').collect();
                kept.push('\n');
                kept
            })
            .collect()
    }

    /// Replace the result's text with its filtered lines and validate it if
    /// confidence and shape allow. Returns the payload on a match.
    pub fn evaluate(&self, result: &mut OcrResult) -> Option<MrzPayload> {
        let line_count = raw_line_count(&result.text);
        let filtered = self.filter_lines(&result.text);
        result.text = filtered;

        if result.mean_confidence < self.settings.min_mean_confidence {
            debug!("Mean confidence {} below gate", result.mean_confidence);
            return None;
        }
        if line_count < self.settings.min_lines || line_count > self.settings.max_lines {
            debug!("{} lines recognized, not a candidate", line_count);
            return None;
        }
        if result.text.is_empty() {
            return None;
        }

        let payload = self.validator.validate(&result.text)?;
        info!("{} zone validated", payload.format);
        Some(payload)
    }
}

/// Lines in the text, ignoring trailing empty ones
fn raw_line_count(text: &str) -> usize {
    let trimmed = text.trim_end_matches('\n');
    if trimmed.is_empty() {
        0
    } else {
        trimmed.split('\n').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrz::IcaoValidator;
    use image::GrayImage;
    use std::time::Duration;

    const TD3: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\
                       L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    fn result(text: &str, mean_confidence: u8) -> OcrResult {
        OcrResult {
            text: text.to_string(),
            word_confidences: vec![mean_confidence],
            mean_confidence,
            time_required: Duration::from_millis(5),
            region_boxes: None,
            textline_boxes: None,
            strip_boxes: None,
            word_boxes: vec![],
            image: GrayImage::new(1, 1),
        }
    }

    fn gate() -> CompletionGate {
        CompletionGate::new(ValidationSettings::default(), Box::new(IcaoValidator))
    }

    #[test]
    fn test_filter_lines() {
        let gate = gate();
        assert_eq!(gate.filter_lines("SHORT\nA LONGER LINE HERE"), "ALONGERLINEHERE\n");
        assert_eq!(gate.filter_lines("0123456789"), "");
        assert_eq!(gate.filter_lines("01234567890"), "01234567890\n");
    }

    #[test]
    fn test_short_lines_are_not_validated() {
        let mut ocr = result("ABC DEF\nGHI JKL", 80);
        assert!(gate().evaluate(&mut ocr).is_none());
        assert_eq!(ocr.text, "");
    }

    #[test]
    fn test_valid_zone_completes() {
        let mut ocr = result(TD3, 80);
        let payload = gate().evaluate(&mut ocr).unwrap();
        assert_eq!(payload.document_number, "L898902C3");
        assert!(ocr.text.ends_with('\n'));
    }

    #[test]
    fn test_spaces_inside_lines_are_stripped() {
        let spaced = TD3.replace("L898902C36", "L898 902C3 6");
        let mut ocr = result(&spaced, 80);
        assert!(gate().evaluate(&mut ocr).is_some());
    }

    #[test]
    fn test_low_confidence_is_not_validated() {
        let mut ocr = result(TD3, 49);
        assert!(gate().evaluate(&mut ocr).is_none());
    }

    #[test]
    fn test_line_count_bounds() {
        let one_line = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<";
        assert!(gate().evaluate(&mut result(one_line, 90)).is_none());

        let four_lines = format!("{}\nEXTRA NOISE LINE\nMORE NOISE LINE", TD3);
        assert!(gate().evaluate(&mut result(&four_lines, 90)).is_none());

        // Trailing newline is not a line of its own
        let trailing = format!("{}\n", TD3);
        assert!(gate().evaluate(&mut result(&trailing, 90)).is_some());
    }

    #[test]
    fn test_noise_line_within_bounds_is_filtered() {
        // Three raw lines, the short one dropped before validation
        let noisy = format!("{}\nNOISE", TD3);
        assert!(gate().evaluate(&mut result(&noisy, 90)).is_some());
    }

    #[test]
    fn test_raw_line_count() {
        assert_eq!(raw_line_count(""), 0);
        assert_eq!(raw_line_count("A\n\n"), 1);
        assert_eq!(raw_line_count("A\n\nB"), 3);
    }
}
