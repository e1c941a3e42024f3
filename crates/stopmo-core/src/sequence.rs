use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::video::decoder::VideoDecoder;
use crate::video::frame::Frame;

/// An ordered, finite sequence of decoded frames plus source metadata.
/// Immutable once read; one sequence is read per render request.
pub struct SourceSequence {
    frames: Vec<Frame>,
    fps: f64,
    width: u32,
    height: u32,
}

impl SourceSequence {
    pub fn new(frames: Vec<Frame>, fps: f64, width: u32, height: u32) -> Self {
        Self {
            frames,
            fps,
            width,
            height,
        }
    }

    /// Decode every frame of a video file into memory.
    pub fn read(path: &Path) -> Result<Self> {
        let mut decoder = VideoDecoder::open(path)?;
        let fps = decoder.fps();
        let width = decoder.width();
        let height = decoder.height();

        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame()? {
            frames.push(frame);
        }

        info!(
            ?path,
            frame_count = frames.len(),
            fps,
            width,
            height,
            "source sequence read"
        );

        Ok(Self::new(frames, fps, width, height))
    }

    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total source duration in seconds (0.0 when the fps is unknown).
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.frames.len() as f64 / self.fps
        } else {
            0.0
        }
    }
}
