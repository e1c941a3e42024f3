use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stopmo_core::video::encoder::Quality;

#[derive(Parser)]
#[command(name = "stopmo", about = "Stop-motion frame-timing processor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Re-time a video by keeping every Nth frame.
    Render {
        /// Path to the input video file (MP4, AVI, MOV, MKV).
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the output video.
        #[arg(short, long)]
        output: PathBuf,

        /// Reduction factor: keep every Nth frame (must be >= 2).
        #[arg(short, long, conflicts_with = "preset", required_unless_present = "preset")]
        factor: Option<u32>,

        /// Stop-motion preset instead of an explicit factor.
        #[arg(short, long, value_enum)]
        preset: Option<Preset>,

        /// Reduce the frame rate instead of holding frames: the output gets
        /// shorter rather than keeping the original duration.
        #[arg(long)]
        no_maintain_duration: bool,

        /// Apply the contrast/sharpness enhancement to kept frames.
        #[arg(short, long)]
        enhance: bool,

        /// Output compression level.
        #[arg(short, long, value_enum, default_value_t)]
        quality: QualityArg,

        /// Write a JSON render report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Re-time a video using an edited timeline config.
    Timeline {
        /// Path to the input video file.
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the output video.
        #[arg(short, long)]
        output: PathBuf,

        /// Timeline JSON config (an edited `timeline.json` from `extract`).
        #[arg(short, long)]
        config: PathBuf,

        /// Apply the contrast/sharpness enhancement to rendered frames.
        #[arg(short, long)]
        enhance: bool,

        /// Output compression level.
        #[arg(short, long, value_enum, default_value_t)]
        quality: QualityArg,

        /// Write a JSON render report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Extract frames and thumbnails into an editable timeline draft.
    Extract {
        /// Path to the input video file.
        #[arg(short, long)]
        input: PathBuf,

        /// Directory to write thumbnails and timeline.json into.
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Sample every Nth frame.
        #[arg(short, long, default_value_t = 2)]
        factor: u32,

        /// Thumbnail width in pixels.
        #[arg(long, default_value_t = 120)]
        thumbnail_width: u32,
    },

    /// Probe a video and print its metadata.
    Info {
        /// Path to the video file.
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Animation shooting presets, mapped to reduction factors.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Preset {
    /// Each pose held for 2 frames (12fps effective from 24fps).
    Twos,
    /// Each pose held for 3 frames (8fps effective from 24fps).
    Threes,
    /// Each pose held for 4 frames (6fps effective from 24fps).
    Fours,
}

impl Preset {
    pub fn factor(self) -> u32 {
        match self {
            Preset::Twos => 2,
            Preset::Threes => 3,
            Preset::Fours => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum QualityArg {
    #[default]
    High,
    Medium,
    Low,
}

impl From<QualityArg> for Quality {
    fn from(q: QualityArg) -> Self {
        match q {
            QualityArg::High => Quality::High,
            QualityArg::Medium => Quality::Medium,
            QualityArg::Low => Quality::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_factors() {
        assert_eq!(Preset::Twos.factor(), 2);
        assert_eq!(Preset::Threes.factor(), 3);
        assert_eq!(Preset::Fours.factor(), 4);
    }

    #[test]
    fn render_requires_factor_or_preset() {
        let err = Cli::try_parse_from(["stopmo", "render", "-i", "a.mp4", "-o", "b.mp4"]);
        assert!(err.is_err());

        let ok = Cli::try_parse_from([
            "stopmo", "render", "-i", "a.mp4", "-o", "b.mp4", "--preset", "twos",
        ]);
        assert!(ok.is_ok());
    }

    #[test]
    fn factor_conflicts_with_preset() {
        let err = Cli::try_parse_from([
            "stopmo", "render", "-i", "a.mp4", "-o", "b.mp4", "--factor", "2", "--preset", "twos",
        ]);
        assert!(err.is_err());
    }
}
