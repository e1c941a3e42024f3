use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::frame::Frame;

/// Video metadata obtained by probing with ffprobe.
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container-declared frame count, when the format carries one.
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    /// Source duration in seconds, when the frame count is known.
    pub fn duration_seconds(&self) -> Option<f64> {
        match self.frame_count {
            Some(n) if self.fps > 0.0 => Some(n as f64 / self.fps),
            _ => None,
        }
    }
}

/// Probe a video file's stream metadata with ffprobe.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    info!(?path, "probing video metadata with ffprobe");

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,nb_frames",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("failed to run ffprobe — is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        bail!("ffprobe failed: {stderr}");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let info = parse_probe_output(&stdout)?;

    if info.fps <= 0.0 {
        warn!(fps = info.fps, ?path, "video has non-positive fps, timestamps will be 0.0");
    }

    info!(
        width = info.width,
        height = info.height,
        fps = info.fps,
        frame_count = ?info.frame_count,
        "probe completed"
    );
    Ok(info)
}

/// Parse ffprobe csv output: "width,height,num/den[,nb_frames]".
/// nb_frames is "N/A" for containers that don't declare a frame count.
fn parse_probe_output(stdout: &str) -> Result<VideoInfo> {
    let parts: Vec<&str> = stdout.trim().split(',').collect();
    if parts.len() < 3 {
        error!(%stdout, "unexpected ffprobe output format, expected width,height,fps");
        bail!("unexpected ffprobe output: {stdout}");
    }

    let width: u32 = parts[0].parse().context("failed to parse width")?;
    let height: u32 = parts[1].parse().context("failed to parse height")?;

    let fps = if let Some((num, den)) = parts[2].split_once('/') {
        let num: f64 = num.parse().context("failed to parse fps numerator")?;
        let den: f64 = den.parse().context("failed to parse fps denominator")?;
        if den > 0.0 { num / den } else { 0.0 }
    } else {
        parts[2].parse().context("failed to parse fps")?
    };

    let frame_count = parts.get(3).and_then(|v| v.parse::<u64>().ok());

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
    })
}

/// Decodes video frames by piping raw RGB24 data from the ffmpeg CLI.
pub struct VideoDecoder {
    child: Child,
    width: u32,
    height: u32,
    fps: f64,
    frames_read: u32,
    frame_bytes: usize,
}

impl VideoDecoder {
    /// Open a video file for decoding.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("video file does not exist: {}", path.display());
        }

        let info = probe(path)?;
        if info.width == 0 || info.height == 0 {
            bail!("invalid video dimensions: {}x{}", info.width, info.height);
        }

        info!(?path, "spawning ffmpeg decoder process");

        let child = Command::new("ffmpeg")
            .args(["-i"])
            .arg(path)
            .args([
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-v", "error",
                "pipe:1",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg — is ffmpeg installed?")?;

        let frame_bytes = (info.width as usize) * (info.height as usize) * 3;

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child,
            width: info.width,
            height: info.height,
            fps: info.fps,
            frames_read: 0,
            frame_bytes,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Read the next frame from the ffmpeg pipe, or `None` if the video is finished.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .context("ffmpeg stdout not available")?;

        let mut buf = vec![0u8; self.frame_bytes];
        let first = stdout
            .read(&mut buf)
            .context("failed to read from ffmpeg pipe")?;
        if first == 0 {
            info!(total_frames = self.frames_read, "video stream ended");
            return Ok(None);
        }
        if first < self.frame_bytes {
            stdout.read_exact(&mut buf[first..]).with_context(|| {
                format!(
                    "ffmpeg stream ended mid-frame at frame {} (expected {} bytes)",
                    self.frames_read, self.frame_bytes,
                )
            })?;
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .context("failed to create RgbImage from raw frame data")?;

        let frame = Frame::new(image, self.frames_read, self.fps);
        self.frames_read += 1;

        debug!(
            frame_number = frame.frame_number,
            timestamp_seconds = frame.timestamp_seconds,
            "decoded frame"
        );

        Ok(Some(frame))
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        info!(total_frames = self.frames_read, "closing video decoder");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_with_frame_count() {
        let info = parse_probe_output("1920,1080,30000/1001,300\n").unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.frame_count, Some(300));
    }

    #[test]
    fn parse_probe_without_frame_count() {
        let info = parse_probe_output("640,480,24/1,N/A").unwrap();
        assert_eq!(info.fps, 24.0);
        assert_eq!(info.frame_count, None);
        assert_eq!(info.duration_seconds(), None);
    }

    #[test]
    fn parse_probe_plain_fps() {
        let info = parse_probe_output("320,240,25").unwrap();
        assert_eq!(info.fps, 25.0);
    }

    #[test]
    fn parse_probe_rejects_garbage() {
        assert!(parse_probe_output("not,even").is_err());
        assert!(parse_probe_output("a,b,c").is_err());
    }

    #[test]
    fn duration_from_frame_count() {
        let info = VideoInfo {
            width: 640,
            height: 480,
            fps: 24.0,
            frame_count: Some(48),
        };
        assert!((info.duration_seconds().unwrap() - 2.0).abs() < 1e-9);
    }
}
