use crate::capture::CapturedFrame;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Outcome of running recognition over one frame. `NoText` is a valid result,
/// distinct from an engine failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Text(String),
    NoText,
}

impl Recognition {
    pub fn from_output(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            Recognition::NoText
        } else {
            Recognition::Text(text.to_string())
        }
    }
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Recognition>;
}

const TESSERACT_TIMEOUT: Duration = Duration::from_secs(30);
static NEXT_INPUT: AtomicU64 = AtomicU64::new(1);

/// Runs the `tesseract` CLI over a PNG of the frame.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: String,
    language: String,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    fn input_path() -> PathBuf {
        std::env::temp_dir().join(format!(
            "reply-bubble-ocr-{}-{}.png",
            std::process::id(),
            NEXT_INPUT.fetch_add(1, Ordering::Relaxed)
        ))
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Recognition> {
        let input = Self::input_path();
        let image = frame.image().clone();
        let path = input.clone();
        tokio::task::spawn_blocking(move || image.save(&path))
            .await
            .context("frame encoder task failed")?
            .with_context(|| format!("failed to write {}", input.display()))?;

        let mut command = Command::new(&self.program);
        command
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .kill_on_drop(true);
        let output = timeout(TESSERACT_TIMEOUT, command.output()).await;
        let _ = std::fs::remove_file(&input);

        let output = output
            .map_err(|_| {
                anyhow!(
                    "{} timed out after {:.0}s",
                    self.program,
                    TESSERACT_TIMEOUT.as_secs_f32()
                )
            })?
            .with_context(|| format!("failed to execute {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with status {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        Ok(Recognition::from_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{Recognition, TesseractRecognizer, TextRecognizer};
    use crate::capture::CapturedFrame;
    use image::RgbaImage;

    #[test]
    fn blank_output_is_no_text() {
        assert_eq!(Recognition::from_output("  \n\x0c"), Recognition::NoText);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            Recognition::from_output("\n Hey are you free tomorrow?\n\x0c"),
            Recognition::Text("Hey are you free tomorrow?".to_string())
        );
    }

    #[tokio::test]
    async fn missing_engine_is_an_error_not_no_text() {
        let recognizer = TesseractRecognizer::new("definitely-not-a-real-ocr-binary", "eng");
        let frame = CapturedFrame::new(RgbaImage::new(2, 2));
        let err = recognizer.recognize(&frame).await.expect_err("spawn fails");
        assert!(err.to_string().contains("failed to execute"));
    }
}
