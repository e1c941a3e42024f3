use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::enhance::{enhance_frame, EnhanceOptions};
use crate::sequence::SourceSequence;

/// Validation failures of the frame-timing transformer. All are reported
/// synchronously and abort the render before any output frame exists.
#[derive(Debug, Error)]
pub enum TimingError {
    #[error("invalid reduction spec: {0}")]
    InvalidSpec(String),
    #[error("source sequence has no frames")]
    EmptySource,
    #[error(
        "timeline entry {entry} references source frame {index}, but the source has {frame_count} frames"
    )]
    OutOfRangeReference {
        entry: usize,
        index: usize,
        frame_count: usize,
    },
}

/// One step of a timeline-editor render: which source frame to show, for
/// how many output frames, and whether it is currently part of the cut.
///
/// Defaults match the timeline editor: a bare `{"source_frame_index": n}`
/// entry holds for 2 frames and is included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub source_frame_index: usize,
    #[serde(default = "default_hold_count")]
    pub hold_count: u32,
    #[serde(default = "default_included")]
    pub included: bool,
}

fn default_hold_count() -> u32 {
    2
}

fn default_included() -> bool {
    true
}

/// Explicit per-frame timing, in playback order. Entries may reference
/// source frames out of order or more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSpec {
    pub entries: Vec<TimelineEntry>,
}

impl TimelineSpec {
    /// Load a timeline from a JSON config file. Unknown fields (for example
    /// the metadata block of an extracted timeline draft) are ignored.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read timeline config {}", path.display()))?;
        let spec: TimelineSpec = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse timeline config {}", path.display()))?;
        info!(?path, entries = spec.entries.len(), "timeline config loaded");
        Ok(spec)
    }
}

/// A retained frame and the number of consecutive output frames it occupies.
#[derive(Debug)]
pub struct HeldFrame {
    pub image: RgbImage,
    pub source_index: usize,
    pub hold: u32,
}

/// The transformed frame sequence: held frames in playback order plus the
/// container frame rate to encode them at. Expanding each hold in order
/// yields the exact deterministic output frame order.
#[derive(Debug)]
pub struct OutputSequence {
    holds: Vec<HeldFrame>,
    fps: f64,
    width: u32,
    height: u32,
}

impl OutputSequence {
    pub fn holds(&self) -> &[HeldFrame] {
        &self.holds
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

    /// Total expanded output frame count (sum of holds).
    pub fn frame_count(&self) -> usize {
        self.holds.iter().map(|h| h.hold as usize).sum()
    }

    /// Iterate output frames in expanded order, repeating each held frame.
    pub fn frames(&self) -> impl Iterator<Item = &RgbImage> {
        self.holds
            .iter()
            .flat_map(|h| std::iter::repeat(&h.image).take(h.hold as usize))
    }

    /// Source index of every expanded output frame, in order.
    pub fn source_indices(&self) -> Vec<usize> {
        self.holds
            .iter()
            .flat_map(|h| std::iter::repeat(h.source_index).take(h.hold as usize))
            .collect()
    }
}

/// Frame counts and rates derived from a reduction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReductionReport {
    pub original_fps: f64,
    /// Container frame rate of the output: the original rate when duration
    /// is maintained, `original / factor` for a true rate reduction.
    pub new_fps: f64,
    pub original_frame_count: usize,
    pub new_frame_count: usize,
}

/// Result of a reduction: the output sequence plus its derived metadata.
#[derive(Debug)]
pub struct Reduction {
    pub output: OutputSequence,
    pub report: ReductionReport,
}

/// Apply the optional enhancement stage to a kept frame.
fn stage_frame(image: &RgbImage, enhance: Option<&EnhanceOptions>) -> RgbImage {
    match enhance {
        Some(opts) => enhance_frame(image, opts),
        None => image.clone(),
    }
}

/// Reduce a sequence by keeping every `factor`-th frame.
///
/// With `maintain_duration` each kept frame at index `i` holds for
/// `min(factor, N - i)` output frames: hold groups tile `[0, N)` exactly,
/// the final kept frame absorbing whatever remainder is left, so the output
/// length always equals the source length. Without it each kept frame
/// appears once and the container rate drops by `factor`.
pub fn reduce_by_factor(
    source: &SourceSequence,
    factor: u32,
    maintain_duration: bool,
    enhance: Option<&EnhanceOptions>,
) -> Result<Reduction, TimingError> {
    if factor < 2 {
        return Err(TimingError::InvalidSpec(format!(
            "reduction factor must be >= 2, got {factor}"
        )));
    }
    let n = source.frame_count();
    if n == 0 {
        return Err(TimingError::EmptySource);
    }

    info!(
        factor,
        maintain_duration,
        enhance = enhance.is_some(),
        source_frames = n,
        "reducing by factor"
    );

    let mut holds = Vec::with_capacity(n.div_ceil(factor as usize));
    for i in (0..n).step_by(factor as usize) {
        let image = stage_frame(&source.frame(i).image, enhance);
        let hold = if maintain_duration {
            (n - i).min(factor as usize) as u32
        } else {
            1
        };
        debug!(source_index = i, hold, "kept frame");
        holds.push(HeldFrame {
            image,
            source_index: i,
            hold,
        });
    }

    let new_fps = if maintain_duration {
        source.fps()
    } else {
        source.fps() / factor as f64
    };

    let output = OutputSequence {
        holds,
        fps: new_fps,
        width: source.width(),
        height: source.height(),
    };
    let report = ReductionReport {
        original_fps: source.fps(),
        new_fps,
        original_frame_count: n,
        new_frame_count: output.frame_count(),
    };

    info!(
        new_frame_count = report.new_frame_count,
        new_fps = report.new_fps,
        "factor reduction complete"
    );
    Ok(Reduction { output, report })
}

/// Render a sequence with explicit per-frame timing.
///
/// Every entry is validated up front, included or not; any out-of-range
/// reference or zero hold aborts the whole render before a single output
/// frame is produced. Excluded entries contribute nothing; the rest are
/// held in entry order, which may revisit source frames arbitrarily.
pub fn reduce_by_timeline(
    source: &SourceSequence,
    timeline: &TimelineSpec,
    enhance: Option<&EnhanceOptions>,
) -> Result<Reduction, TimingError> {
    let n = source.frame_count();
    if n == 0 {
        return Err(TimingError::EmptySource);
    }

    for (pos, entry) in timeline.entries.iter().enumerate() {
        if entry.hold_count == 0 {
            return Err(TimingError::InvalidSpec(format!(
                "timeline entry {pos} has hold_count 0, must be >= 1"
            )));
        }
        if entry.source_frame_index >= n {
            return Err(TimingError::OutOfRangeReference {
                entry: pos,
                index: entry.source_frame_index,
                frame_count: n,
            });
        }
    }

    info!(
        entries = timeline.entries.len(),
        enhance = enhance.is_some(),
        source_frames = n,
        "rendering timeline"
    );

    let mut holds = Vec::new();
    for entry in &timeline.entries {
        if !entry.included {
            continue;
        }
        let image = stage_frame(&source.frame(entry.source_frame_index).image, enhance);
        debug!(
            source_index = entry.source_frame_index,
            hold = entry.hold_count,
            "timeline frame"
        );
        holds.push(HeldFrame {
            image,
            source_index: entry.source_frame_index,
            hold: entry.hold_count,
        });
    }

    let output = OutputSequence {
        holds,
        fps: source.fps(),
        width: source.width(),
        height: source.height(),
    };
    let report = ReductionReport {
        original_fps: source.fps(),
        new_fps: source.fps(),
        original_frame_count: n,
        new_frame_count: output.frame_count(),
    };

    info!(new_frame_count = report.new_frame_count, "timeline render complete");
    Ok(Reduction { output, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::Frame;
    use image::{Rgb, RgbImage};
    use tracing_test::traced_test;

    /// Synthetic sequence where each frame's red channel encodes its index,
    /// so output frames can be traced back to their source.
    fn seq(n: usize) -> SourceSequence {
        let frames = (0..n)
            .map(|i| {
                let image = RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0]));
                Frame::new(image, i as u32, 24.0)
            })
            .collect();
        SourceSequence::new(frames, 24.0, 4, 4)
    }

    fn entry(index: usize, hold: u32, included: bool) -> TimelineEntry {
        TimelineEntry {
            source_frame_index: index,
            hold_count: hold,
            included,
        }
    }

    #[test]
    fn maintain_duration_preserves_length() {
        for n in 1..=25 {
            for factor in 2..=5 {
                let r = reduce_by_factor(&seq(n), factor, true, None).unwrap();
                assert_eq!(
                    r.output.frame_count(),
                    n,
                    "n={n} factor={factor} should keep original length"
                );
                assert_eq!(r.report.new_frame_count, n);
                assert_eq!(r.report.new_fps, 24.0);
            }
        }
    }

    #[test]
    fn rate_reduction_length_is_ceil() {
        for n in 1..=25 {
            for factor in 2..=5usize {
                let r = reduce_by_factor(&seq(n), factor as u32, false, None).unwrap();
                assert_eq!(r.output.frame_count(), n.div_ceil(factor));
            }
        }
    }

    #[test]
    fn rate_reduction_divides_fps() {
        let r = reduce_by_factor(&seq(10), 2, false, None).unwrap();
        assert_eq!(r.report.original_fps, 24.0);
        assert_eq!(r.report.new_fps, 12.0);
        assert_eq!(r.output.fps(), 12.0);
    }

    #[test]
    #[traced_test]
    fn ten_frames_on_threes_holds_the_remainder() {
        let r = reduce_by_factor(&seq(10), 3, true, None).unwrap();
        assert_eq!(r.output.frame_count(), 10);
        assert_eq!(
            r.output.source_indices(),
            vec![0, 0, 0, 3, 3, 3, 6, 6, 6, 9]
        );
    }

    #[test]
    fn five_frames_on_twos_without_maintain() {
        let r = reduce_by_factor(&seq(5), 2, false, None).unwrap();
        assert_eq!(r.output.frame_count(), 3);
        assert_eq!(r.output.source_indices(), vec![0, 2, 4]);
    }

    #[test]
    fn factor_below_two_is_rejected() {
        for factor in [0, 1] {
            let err = reduce_by_factor(&seq(5), factor, true, None).unwrap_err();
            assert!(matches!(err, TimingError::InvalidSpec(_)), "factor={factor}");
        }
    }

    #[test]
    fn empty_source_is_rejected() {
        let empty = SourceSequence::new(Vec::new(), 24.0, 4, 4);
        assert!(matches!(
            reduce_by_factor(&empty, 2, true, None),
            Err(TimingError::EmptySource)
        ));
        let timeline = TimelineSpec { entries: vec![] };
        assert!(matches!(
            reduce_by_timeline(&empty, &timeline, None),
            Err(TimingError::EmptySource)
        ));
    }

    #[test]
    fn output_frames_carry_source_pixels() {
        let source = seq(6);
        let r = reduce_by_factor(&source, 3, true, None).unwrap();
        let frames: Vec<&RgbImage> = r.output.frames().collect();
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[0].get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(frames[3].get_pixel(0, 0), &Rgb([3, 0, 0]));
        assert_eq!(frames[5].get_pixel(0, 0), &Rgb([3, 0, 0]));
    }

    #[test]
    fn enhancement_stage_matches_direct_enhancement() {
        let source = seq(4);
        let opts = EnhanceOptions::default();
        let r = reduce_by_factor(&source, 2, false, Some(&opts)).unwrap();
        let expected = crate::enhance::enhance_frame(&source.frame(2).image, &opts);
        assert_eq!(r.output.holds()[1].image.as_raw(), expected.as_raw());
    }

    #[test]
    fn timeline_concrete_scenario() {
        let timeline = TimelineSpec {
            entries: vec![entry(2, 3, true), entry(0, 1, false), entry(4, 2, true)],
        };
        let r = reduce_by_timeline(&seq(5), &timeline, None).unwrap();
        assert_eq!(r.output.frame_count(), 5);
        assert_eq!(r.output.source_indices(), vec![2, 2, 2, 4, 4]);
        assert_eq!(r.report.new_frame_count, 5);
    }

    #[test]
    fn timeline_length_is_order_independent() {
        let forward = TimelineSpec {
            entries: vec![entry(0, 2, true), entry(3, 4, true), entry(7, 1, true)],
        };
        let shuffled = TimelineSpec {
            entries: vec![entry(7, 1, true), entry(0, 2, true), entry(3, 4, true)],
        };
        let a = reduce_by_timeline(&seq(8), &forward, None).unwrap();
        let b = reduce_by_timeline(&seq(8), &shuffled, None).unwrap();
        assert_eq!(a.output.frame_count(), 7);
        assert_eq!(b.output.frame_count(), 7);
    }

    #[test]
    fn timeline_allows_repeats_and_reordering() {
        let timeline = TimelineSpec {
            entries: vec![entry(4, 1, true), entry(1, 2, true), entry(4, 1, true)],
        };
        let r = reduce_by_timeline(&seq(5), &timeline, None).unwrap();
        assert_eq!(r.output.source_indices(), vec![4, 1, 1, 4]);
    }

    #[test]
    #[traced_test]
    fn timeline_out_of_range_aborts() {
        let timeline = TimelineSpec {
            entries: vec![entry(0, 1, true), entry(5, 1, true)],
        };
        let err = reduce_by_timeline(&seq(5), &timeline, None).unwrap_err();
        match err {
            TimingError::OutOfRangeReference {
                entry,
                index,
                frame_count,
            } => {
                assert_eq!(entry, 1);
                assert_eq!(index, 5);
                assert_eq!(frame_count, 5);
            }
            other => panic!("expected OutOfRangeReference, got {other:?}"),
        }
    }

    #[test]
    fn timeline_validates_excluded_entries_too() {
        let timeline = TimelineSpec {
            entries: vec![entry(99, 1, false)],
        };
        assert!(matches!(
            reduce_by_timeline(&seq(5), &timeline, None),
            Err(TimingError::OutOfRangeReference { .. })
        ));
    }

    #[test]
    fn timeline_zero_hold_is_rejected() {
        let timeline = TimelineSpec {
            entries: vec![entry(0, 0, true)],
        };
        assert!(matches!(
            reduce_by_timeline(&seq(5), &timeline, None),
            Err(TimingError::InvalidSpec(_))
        ));
    }

    #[test]
    fn timeline_all_excluded_yields_empty_output() {
        let timeline = TimelineSpec {
            entries: vec![entry(0, 2, false), entry(1, 2, false)],
        };
        let r = reduce_by_timeline(&seq(3), &timeline, None).unwrap();
        assert_eq!(r.output.frame_count(), 0);
        assert_eq!(r.report.new_frame_count, 0);
    }

    #[test]
    fn timeline_entry_serde_defaults() {
        let spec: TimelineSpec =
            serde_json::from_str(r#"{"entries": [{"source_frame_index": 3}]}"#).unwrap();
        assert_eq!(spec.entries.len(), 1);
        assert_eq!(spec.entries[0].source_frame_index, 3);
        assert_eq!(spec.entries[0].hold_count, 2);
        assert!(spec.entries[0].included);
    }

    #[test]
    fn timeline_ignores_unknown_fields() {
        // Extracted drafts carry a metadata block alongside the entries.
        let json = r#"{
            "video": {"fps": 24.0, "width": 4, "height": 4},
            "entries": [{"source_frame_index": 0, "hold_count": 3, "included": true}]
        }"#;
        let spec: TimelineSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.entries[0].hold_count, 3);
    }
}
