use std::fs;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sequence::SourceSequence;

const THUMBNAIL_JPEG_QUALITY: u8 = 85;
const TIMELINE_FILE: &str = "timeline.json";

/// Parameters for timeline extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractConfig {
    /// Sample every Nth source frame (1 = every frame).
    pub factor: u32,
    /// Width of the generated thumbnails; height follows the aspect ratio.
    pub thumbnail_width: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            factor: 2,
            thumbnail_width: 120,
        }
    }
}

/// Source metadata block written at the top of an extracted timeline draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftMetadata {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub total_frames: usize,
    pub duration_seconds: f64,
    pub extracted_frames: usize,
    pub reduction_factor: u32,
}

/// One editable row of a timeline draft. The `source_frame_index`,
/// `hold_count` and `included` fields line up with `TimelineEntry`, so an
/// edited draft file feeds straight into the timeline render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEntry {
    /// Position in the extracted sequence (0-based).
    pub index: usize,
    pub source_frame_index: usize,
    pub timestamp_seconds: f64,
    pub hold_count: u32,
    pub included: bool,
    /// Thumbnail file name, relative to the extraction directory.
    pub thumbnail: String,
}

/// Hold-duration summary for the editing client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldSummary {
    /// Sum of hold counts across all entries: the output frame count the
    /// draft would render before any editing.
    pub total_hold_duration: u32,
    pub default_hold: u32,
    pub presets: HoldPresets,
}

/// Named hold durations the editor offers as quick choices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldPresets {
    pub fast_action: u32,
    pub normal: u32,
    pub slow_motion: u32,
    pub dramatic_pause: u32,
}

impl Default for HoldPresets {
    fn default() -> Self {
        Self {
            fast_action: 1,
            normal: 2,
            slow_motion: 4,
            dramatic_pause: 6,
        }
    }
}

/// An extracted timeline: metadata plus one entry per sampled frame,
/// persisted as `timeline.json` next to the thumbnails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineDraft {
    pub video: DraftMetadata,
    pub holds: HoldSummary,
    pub entries: Vec<DraftEntry>,
}

/// Decode a video and build an editable timeline draft in `out_dir`.
pub fn extract_timeline(input: &Path, out_dir: &Path, config: &ExtractConfig) -> Result<TimelineDraft> {
    let source = SourceSequence::read(input)?;
    build_draft(&source, out_dir, config)
}

/// Sample every Nth frame of a decoded sequence, write JPEG thumbnails and
/// the timeline draft into `out_dir`, and return the draft.
pub fn build_draft(
    source: &SourceSequence,
    out_dir: &Path,
    config: &ExtractConfig,
) -> Result<TimelineDraft> {
    if config.factor == 0 {
        bail!("extraction factor must be >= 1, got 0");
    }
    if config.thumbnail_width == 0 {
        bail!("thumbnail width must be >= 1, got 0");
    }
    if source.frame_count() == 0 {
        bail!("source video has no frames");
    }

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create extraction directory {}", out_dir.display()))?;

    info!(
        ?out_dir,
        factor = config.factor,
        thumbnail_width = config.thumbnail_width,
        source_frames = source.frame_count(),
        "extracting timeline"
    );

    let mut entries = Vec::new();
    for (index, i) in (0..source.frame_count())
        .step_by(config.factor as usize)
        .enumerate()
    {
        let frame = source.frame(i);
        let thumbnail = format!("thumb_{index:06}.jpg");
        save_thumbnail(&frame.image, &out_dir.join(&thumbnail), config.thumbnail_width)?;

        debug!(index, source_frame_index = i, %thumbnail, "extracted frame");
        entries.push(DraftEntry {
            index,
            source_frame_index: i,
            timestamp_seconds: frame.timestamp_seconds,
            // Default hold matches the sampling stride so the draft plays
            // back at the original duration before any editing.
            hold_count: config.factor,
            included: true,
            thumbnail,
        });
    }

    let total_hold_duration = entries.iter().map(|e| e.hold_count).sum();
    let draft = TimelineDraft {
        video: DraftMetadata {
            fps: source.fps(),
            width: source.width(),
            height: source.height(),
            total_frames: source.frame_count(),
            duration_seconds: source.duration_seconds(),
            extracted_frames: entries.len(),
            reduction_factor: config.factor,
        },
        holds: HoldSummary {
            total_hold_duration,
            default_hold: config.factor,
            presets: HoldPresets::default(),
        },
        entries,
    };

    let path = out_dir.join(TIMELINE_FILE);
    let json = serde_json::to_string_pretty(&draft).context("failed to serialize timeline draft")?;
    fs::write(&path, json)
        .with_context(|| format!("failed to write timeline draft to {}", path.display()))?;

    info!(
        ?path,
        extracted_frames = draft.entries.len(),
        "timeline draft written"
    );
    Ok(draft)
}

/// Thumbnail dimensions for a target width, preserving aspect ratio.
fn thumbnail_size(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    let target_height =
        ((target_width as u64 * height as u64) / width as u64).max(1) as u32;
    (target_width, target_height)
}

fn save_thumbnail(image: &RgbImage, path: &Path, target_width: u32) -> Result<()> {
    let (w, h) = thumbnail_size(image.width(), image.height(), target_width);
    let thumb = imageops::thumbnail(image, w, h);

    let file = fs::File::create(path)
        .with_context(|| format!("failed to create thumbnail {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, THUMBNAIL_JPEG_QUALITY);
    thumb
        .write_with_encoder(encoder)
        .with_context(|| format!("failed to encode thumbnail {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimelineSpec;
    use crate::video::frame::Frame;
    use image::Rgb;
    use tracing_test::traced_test;

    fn seq(n: usize) -> SourceSequence {
        let frames = (0..n)
            .map(|i| {
                let image = RgbImage::from_fn(8, 6, |x, y| {
                    Rgb([(i * 20) as u8, (x * 30) as u8, (y * 40) as u8])
                });
                Frame::new(image, i as u32, 24.0)
            })
            .collect();
        SourceSequence::new(frames, 24.0, 8, 6)
    }

    #[test]
    fn thumbnail_size_preserves_aspect() {
        assert_eq!(thumbnail_size(1920, 1080, 120), (120, 67));
        assert_eq!(thumbnail_size(640, 480, 120), (120, 90));
        // Extreme aspect ratios never collapse to a zero height.
        assert_eq!(thumbnail_size(4000, 10, 120), (120, 1));
    }

    #[test]
    #[traced_test]
    fn draft_samples_every_nth_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractConfig {
            factor: 3,
            thumbnail_width: 4,
        };
        let draft = build_draft(&seq(10), dir.path(), &config).unwrap();

        assert_eq!(draft.entries.len(), 4);
        assert_eq!(
            draft
                .entries
                .iter()
                .map(|e| e.source_frame_index)
                .collect::<Vec<_>>(),
            vec![0, 3, 6, 9]
        );
        assert!(draft.entries.iter().all(|e| e.hold_count == 3 && e.included));
        assert_eq!(draft.video.extracted_frames, 4);
        assert_eq!(draft.video.total_frames, 10);
        assert_eq!(draft.holds.total_hold_duration, 12);
        assert_eq!(draft.holds.default_hold, 3);
        assert_eq!(draft.holds.presets.fast_action, 1);
        assert_eq!(draft.holds.presets.dramatic_pause, 6);

        for entry in &draft.entries {
            assert!(dir.path().join(&entry.thumbnail).exists());
        }
    }

    #[test]
    fn draft_file_loads_as_timeline_spec() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractConfig {
            factor: 2,
            thumbnail_width: 4,
        };
        build_draft(&seq(5), dir.path(), &config).unwrap();

        let spec = TimelineSpec::load(&dir.path().join(TIMELINE_FILE)).unwrap();
        assert_eq!(spec.entries.len(), 3);
        assert_eq!(spec.entries[1].source_frame_index, 2);
        assert_eq!(spec.entries[1].hold_count, 2);
        assert!(spec.entries[1].included);
    }

    #[test]
    fn rejects_bad_config_and_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let bad_factor = ExtractConfig {
            factor: 0,
            thumbnail_width: 4,
        };
        assert!(build_draft(&seq(3), dir.path(), &bad_factor).is_err());

        let empty = SourceSequence::new(Vec::new(), 24.0, 8, 6);
        assert!(build_draft(&empty, dir.path(), &ExtractConfig::default()).is_err());
    }
}
