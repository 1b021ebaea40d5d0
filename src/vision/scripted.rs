//! Scripted recognizer
//!
//! Plays back recognition results from a TOML transcript instead of running
//! an engine. Used for replaying recorded sessions and for tests.
//!
//! ```toml
//! repeat = false
//!
//! [[result]]
//! text = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<"
//! mean_confidence = 82
//! word_confidences = [82]
//!
//! [[result]]
//! fault = "engine crashed"
//! ```

use anyhow::Context;
use image::GrayImage;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::trace;

use super::ocr::Recognizer;
use crate::capture::geometry::Rect;
use crate::error::{Error, Result};

/// One scripted recognition
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScriptedResult {
    /// Text to report; `None` or empty reports nothing found
    pub text: Option<String>,
    pub mean_confidence: u8,
    pub word_confidences: Vec<u8>,
    /// Fail `set_image` with this message
    pub fault: Option<String>,
    /// Simulated recognition time
    pub delay_ms: u64,
}

impl ScriptedResult {
    pub fn text(text: &str, mean_confidence: u8) -> Self {
        Self {
            text: Some(text.to_string()),
            mean_confidence,
            word_confidences: text.split_whitespace().map(|_| mean_confidence).collect(),
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fault(message: &str) -> Self {
        Self {
            fault: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Transcript {
    #[serde(default)]
    repeat: bool,
    #[serde(default, rename = "result")]
    results: Vec<ScriptedResult>,
}

/// Recognizer that returns scripted results in order
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    script: Vec<ScriptedResult>,
    next: usize,
    repeat: bool,
    current: Option<ScriptedResult>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<ScriptedResult>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// Start over from the first result once the script runs out
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Load a transcript file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse transcript {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let transcript: Transcript = toml::from_str(content)?;
        Ok(Self {
            script: transcript.results,
            repeat: transcript.repeat,
            ..Default::default()
        })
    }

    /// Number of results played so far
    pub fn played(&self) -> usize {
        self.next
    }

    fn next_result(&mut self) -> ScriptedResult {
        if self.script.is_empty() {
            return ScriptedResult::empty();
        }
        let index = if self.repeat {
            self.next % self.script.len()
        } else {
            self.next
        };
        self.next += 1;
        self.script.get(index).cloned().unwrap_or_default()
    }
}

impl Recognizer for ScriptedRecognizer {
    fn set_image(&mut self, image: &GrayImage) -> Result<()> {
        let result = self.next_result();
        trace!("Scripted recognition of {}x{} image", image.width(), image.height());

        if result.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(result.delay_ms));
        }
        if let Some(fault) = result.fault {
            return Err(Error::RecognitionFault(fault));
        }
        self.current = Some(result);
        Ok(())
    }

    fn text(&mut self) -> Result<Option<String>> {
        Ok(self.current.as_ref().and_then(|r| r.text.clone()))
    }

    fn word_confidences(&mut self) -> Result<Vec<u8>> {
        Ok(self
            .current
            .as_ref()
            .map(|r| r.word_confidences.clone())
            .unwrap_or_default())
    }

    fn mean_confidence(&mut self) -> Result<u8> {
        Ok(self.current.as_ref().map(|r| r.mean_confidence).unwrap_or(0))
    }

    fn words(&mut self) -> Result<Vec<Rect>> {
        Ok(Vec::new())
    }

    fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plays_results_in_order() {
        let mut recognizer = ScriptedRecognizer::new(vec![
            ScriptedResult::text("FIRST", 90),
            ScriptedResult::empty(),
        ]);
        let image = GrayImage::new(2, 2);

        recognizer.set_image(&image).unwrap();
        assert_eq!(recognizer.text().unwrap().as_deref(), Some("FIRST"));
        assert_eq!(recognizer.mean_confidence().unwrap(), 90);
        recognizer.clear();
        assert_eq!(recognizer.text().unwrap(), None);

        recognizer.set_image(&image).unwrap();
        assert_eq!(recognizer.text().unwrap(), None);

        // Script exhausted
        recognizer.set_image(&image).unwrap();
        assert_eq!(recognizer.text().unwrap(), None);
        assert_eq!(recognizer.played(), 3);
    }

    #[test]
    fn test_fault_is_reported() {
        let mut recognizer = ScriptedRecognizer::new(vec![ScriptedResult::fault("boom")]);
        let result = recognizer.set_image(&GrayImage::new(1, 1));
        assert!(matches!(result, Err(Error::RecognitionFault(msg)) if msg == "boom"));
    }

    #[test]
    fn test_repeating_script() {
        let mut recognizer = ScriptedRecognizer::new(vec![
            ScriptedResult::text("A", 10),
            ScriptedResult::text("B", 20),
        ])
        .repeating();
        let image = GrayImage::new(1, 1);

        let mut seen = Vec::new();
        for _ in 0..4 {
            recognizer.set_image(&image).unwrap();
            seen.push(recognizer.text().unwrap().unwrap());
            recognizer.clear();
        }
        assert_eq!(seen, vec!["A", "B", "A", "B"]);
    }

    #[test]
    fn test_transcript_from_toml() {
        let recognizer = ScriptedRecognizer::from_toml(
            r#"
            repeat = true

            [[result]]
            text = "HELLO WORLD"
            mean_confidence = 77
            word_confidences = [70, 84]

            [[result]]
            fault = "engine crashed"
            delay_ms = 5
            "#,
        )
        .unwrap();

        assert!(recognizer.repeat);
        assert_eq!(recognizer.script.len(), 2);
        assert_eq!(recognizer.script[0].word_confidences, vec![70, 84]);
        assert_eq!(recognizer.script[1].fault.as_deref(), Some("engine crashed"));
    }
}
