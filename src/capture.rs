use crate::error::PipelineError;
use crate::geometry::DisplayMetrics;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use image::RgbaImage;
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Wait between starting the mirror and sampling it, so the first frame holds
/// real screen content instead of a blank surface.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1200);

static NEXT_CONSENT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Single-use permission to start one mirrored display.
///
/// Deliberately not `Clone`: starting a mirror consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct ConsentToken {
    serial: u64,
    grant: String,
}

impl ConsentToken {
    /// Wraps the platform's opaque grant payload.
    pub fn new(grant: impl Into<String>) -> Self {
        Self {
            serial: NEXT_CONSENT_SERIAL.fetch_add(1, Ordering::Relaxed),
            grant: grant.into(),
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn grant(&self) -> &str {
        &self.grant
    }
}

/// One RGBA sample from the mirror's backing buffer. Rows may be padded:
/// `row_stride` can exceed `width * pixel_stride`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub pixel_stride: usize,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            row_stride: width as usize * 4,
            pixel_stride: 4,
            data: image.into_raw(),
        }
    }
}

/// A decoded still frame with any row padding removed.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    image: RgbaImage,
}

impl CapturedFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn from_raw(raw: RawImage) -> Result<Self> {
        if raw.pixel_stride != 4 {
            bail!("unsupported pixel stride {}", raw.pixel_stride);
        }
        let row_bytes = raw.width as usize * raw.pixel_stride;
        if raw.row_stride < row_bytes {
            bail!(
                "row stride {} is shorter than a {}px row",
                raw.row_stride,
                raw.width
            );
        }
        let height = raw.height as usize;
        let needed = match height {
            0 => 0,
            rows => raw.row_stride * (rows - 1) + row_bytes,
        };
        if raw.data.len() < needed {
            bail!(
                "image buffer holds {} bytes, expected at least {needed}",
                raw.data.len()
            );
        }

        let pixels = if raw.row_stride == row_bytes {
            let mut data = raw.data;
            data.truncate(row_bytes * height);
            data
        } else {
            let mut pixels = Vec::with_capacity(row_bytes * height);
            for row in raw.data.chunks(raw.row_stride).take(height) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
            pixels
        };

        let image = RgbaImage::from_raw(raw.width, raw.height, pixels)
            .ok_or_else(|| anyhow!("pixel buffer does not match frame dimensions"))?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Starts mirrored displays of the device screen.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    async fn start_mirror(
        &self,
        consent: ConsentToken,
        metrics: DisplayMetrics,
    ) -> Result<Arc<dyn MirroredDisplay>>;
}

/// An off-screen copy of the display and the image source reading from it.
#[async_trait]
pub trait MirroredDisplay: Send + Sync {
    /// Latest frame, or `None` when nothing has been produced yet.
    async fn acquire_latest_image(&self) -> Result<Option<RawImage>>;

    /// Releases the virtual display and its reader.
    fn release(&self);
}

struct SessionInner {
    display: Arc<dyn MirroredDisplay>,
    released: AtomicBool,
}

impl SessionInner {
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.display.release();
        true
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.release() {
            debug!("capture session released on drop");
        }
    }
}

/// One consent's worth of capture: a mirror plus its image source.
///
/// Clones share the session; the mirror is released exactly once, by whichever
/// of [`CaptureSession::release`] or the last drop comes first.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("released", &self.is_released())
            .finish()
    }
}

impl CaptureSession {
    pub async fn open(
        capturer: &dyn ScreenCapturer,
        consent: ConsentToken,
        metrics: DisplayMetrics,
    ) -> Result<Self, PipelineError> {
        let display = capturer
            .start_mirror(consent, metrics)
            .await
            .map_err(|err| {
                warn!("failed to start mirrored display: {err:#}");
                PipelineError::CaptureAcquisitionFailed
            })?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                display,
                released: AtomicBool::new(false),
            }),
        })
    }

    /// Waits `settle`, then samples exactly one frame.
    pub async fn grab_frame(&self, settle: Duration) -> Result<CapturedFrame, PipelineError> {
        tokio::time::sleep(settle).await;
        if self.is_released() {
            return Err(PipelineError::CaptureAcquisitionFailed);
        }
        let raw = match self.inner.display.acquire_latest_image().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(PipelineError::CaptureAcquisitionFailed),
            Err(err) => {
                warn!("image acquisition failed: {err:#}");
                return Err(PipelineError::CaptureAcquisitionFailed);
            }
        };
        CapturedFrame::from_raw(raw).map_err(|err| {
            warn!("captured image could not be decoded: {err:#}");
            PipelineError::CaptureAcquisitionFailed
        })
    }

    /// Returns `true` only for the call that actually released the mirror.
    pub fn release(&self) -> bool {
        self.inner.release()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

const CAPTURE_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Captures by running a screenshot tool that writes a PNG to `{output}`.
#[derive(Debug, Clone)]
pub struct CommandCapturer {
    program: String,
    args: Vec<String>,
}

impl CommandCapturer {
    /// `args` may contain `{output}`, replaced by the PNG path to write.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::new(
                "screencapture",
                ["-x", "-t", "png", OUTPUT_PLACEHOLDER]
                    .map(str::to_string)
                    .to_vec(),
            )
        } else {
            Self::new("grim", vec![OUTPUT_PLACEHOLDER.to_string()])
        }
    }
}

#[async_trait]
impl ScreenCapturer for CommandCapturer {
    async fn start_mirror(
        &self,
        consent: ConsentToken,
        _metrics: DisplayMetrics,
    ) -> Result<Arc<dyn MirroredDisplay>> {
        let output = std::env::temp_dir().join(format!(
            "reply-bubble-{}-{}.png",
            std::process::id(),
            consent.serial()
        ));
        Ok(Arc::new(CommandMirror {
            program: self.program.clone(),
            args: self.args.clone(),
            output,
            released: AtomicBool::new(false),
        }))
    }
}

struct CommandMirror {
    program: String,
    args: Vec<String>,
    output: PathBuf,
    released: AtomicBool,
}

#[async_trait]
impl MirroredDisplay for CommandMirror {
    async fn acquire_latest_image(&self) -> Result<Option<RawImage>> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let output = self.output.to_string_lossy();
        let mut command = Command::new(&self.program);
        command.args(self.args.iter().map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output)));
        command.kill_on_drop(true);

        let status = timeout(CAPTURE_COMMAND_TIMEOUT, command.status())
            .await
            .map_err(|_| {
                anyhow!(
                    "{} timed out after {:.0}s",
                    self.program,
                    CAPTURE_COMMAND_TIMEOUT.as_secs_f32()
                )
            })?
            .with_context(|| format!("failed to execute {}", self.program))?;
        if !status.success() {
            bail!("{} exited with status {status}", self.program);
        }

        let path = self.output.clone();
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .context("screenshot decoder task failed")?
            .with_context(|| format!("failed to decode {}", self.output.display()))?
            .to_rgba8();
        let _ = std::fs::remove_file(&self.output);
        Ok(Some(RawImage::from_rgba(image)))
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        let _ = std::fs::remove_file(&self.output);
    }
}
