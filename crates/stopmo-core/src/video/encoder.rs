use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, error, info};

/// Output compression level. High keeps the most claymation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    High,
    Medium,
    Low,
}

impl Quality {
    /// x264 constant rate factor for this level (lower = better).
    pub fn crf(self) -> u32 {
        match self {
            Quality::High => 18,
            Quality::Medium => 23,
            Quality::Low => 28,
        }
    }
}

/// Encodes video by piping raw RGB24 frames into the ffmpeg CLI.
///
/// Mirror of `VideoDecoder`: ffmpeg reads frames from stdin at a fixed
/// geometry and frame rate and writes an H.264 container to `path`.
pub struct VideoEncoder {
    child: Child,
    width: u32,
    height: u32,
    frame_bytes: usize,
    frames_written: u64,
}

impl VideoEncoder {
    /// Spawn an ffmpeg process encoding to `path` at the given geometry and rate.
    pub fn create(path: &Path, width: u32, height: u32, fps: f64, quality: Quality) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("invalid output dimensions: {width}x{height}");
        }
        if fps <= 0.0 {
            bail!("output fps must be positive, got {fps}");
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create output directory {}", parent.display()))?;
            }
        }

        info!(?path, width, height, fps, crf = quality.crf(), "spawning ffmpeg encoder process");

        let child = Command::new("ffmpeg")
            .args(["-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{width}x{height}")])
            .args(["-r", &format!("{fps}")])
            .args(["-i", "pipe:0"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-crf", &quality.crf().to_string()])
            .args(["-v", "error"])
            .arg(path)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg — is ffmpeg installed?")?;

        let frame_bytes = (width as usize) * (height as usize) * 3;

        Ok(Self {
            child,
            width,
            height,
            frame_bytes,
            frames_written: 0,
        })
    }

    /// Write one frame to the ffmpeg pipe. The image must match the encoder geometry.
    pub fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if image.width() != self.width || image.height() != self.height {
            bail!(
                "frame geometry {}x{} does not match encoder {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height,
            );
        }
        debug_assert_eq!(image.as_raw().len(), self.frame_bytes);

        let stdin = self
            .child
            .stdin
            .as_mut()
            .context("ffmpeg stdin not available")?;
        stdin
            .write_all(image.as_raw())
            .with_context(|| format!("failed to write frame {} to ffmpeg pipe", self.frames_written))?;

        self.frames_written += 1;
        debug!(frames_written = self.frames_written, "wrote frame");
        Ok(())
    }

    /// Close the pipe, wait for ffmpeg to flush the container, and report
    /// how many frames were written.
    pub fn finish(mut self) -> Result<u64> {
        // Dropping stdin signals EOF so ffmpeg can finalize the file.
        drop(self.child.stdin.take());

        let output = self
            .child
            .wait_with_output()
            .context("failed to wait for ffmpeg encoder")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(%stderr, "ffmpeg encoder failed");
            bail!("ffmpeg encoder failed: {stderr}");
        }

        info!(frames_written = self.frames_written, "video encoder finished");
        Ok(self.frames_written)
    }
}
