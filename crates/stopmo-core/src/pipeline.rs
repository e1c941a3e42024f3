use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::enhance::EnhanceOptions;
use crate::sequence::SourceSequence;
use crate::timing::{self, Reduction, TimelineSpec};
use crate::video::encoder::{Quality, VideoEncoder};

/// How the source timing is transformed.
pub enum RenderMode {
    /// Keep every `factor`-th frame. With `maintain_duration` the kept
    /// frames are held so the output runs as long as the source.
    Factor { factor: u32, maintain_duration: bool },
    /// Explicit per-frame timing from the timeline editor.
    Timeline(TimelineSpec),
}

/// Parameters for one render request. Each request is independent; there is
/// no shared state between renders beyond the paths the caller hands in.
pub struct RenderConfig {
    pub mode: RenderMode,
    /// Optional enhancement stage applied to kept frames before expansion.
    pub enhance: Option<EnhanceOptions>,
    pub quality: Quality,
}

/// Outcome of a completed render, serializable for machine consumption.
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    #[serde(flatten)]
    pub reduction: timing::ReductionReport,
    /// Perceived pose rate: distinct held frames per second of output.
    pub effective_fps: f64,
    pub original_duration_seconds: f64,
    pub new_duration_seconds: f64,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub compression_ratio: f64,
}

/// Render a video end to end: decode the source once, transform its timing,
/// and encode the result.
///
/// Validation failures (bad factor, empty source, out-of-range timeline
/// reference) surface before the encoder is opened, so they never leave a
/// partial output file behind. An encode failure removes the unfinished file.
pub fn render_video(input: &Path, output: &Path, config: &RenderConfig) -> Result<RenderReport> {
    if !input.exists() {
        bail!("input video does not exist: {}", input.display());
    }

    info!(?input, ?output, "render starting");

    let source = SourceSequence::read(input).context("failed to decode source video")?;

    let reduction = match &config.mode {
        RenderMode::Factor {
            factor,
            maintain_duration,
        } => timing::reduce_by_factor(
            &source,
            *factor,
            *maintain_duration,
            config.enhance.as_ref(),
        )?,
        RenderMode::Timeline(timeline) => {
            timing::reduce_by_timeline(&source, timeline, config.enhance.as_ref())?
        }
    };

    encode_output(output, &reduction, config.quality).inspect_err(|_| {
        // Don't leave a half-written container for the caller to find.
        if output.exists() {
            warn!(?output, "removing partial output after encode failure");
            let _ = std::fs::remove_file(output);
        }
    })?;

    let report = build_report(input, output, &source, &reduction)?;
    info!(
        new_frame_count = report.reduction.new_frame_count,
        new_fps = report.reduction.new_fps,
        output_bytes = report.output_bytes,
        "render complete"
    );
    Ok(report)
}

fn encode_output(output: &Path, reduction: &Reduction, quality: Quality) -> Result<u64> {
    let seq = &reduction.output;
    if seq.frame_count() == 0 {
        bail!("nothing to encode: the timeline excluded every entry");
    }
    let mut encoder =
        VideoEncoder::create(output, seq.width(), seq.height(), seq.fps(), quality)
            .context("failed to open video encoder")?;

    for frame in seq.frames() {
        encoder.write_frame(frame)?;
    }

    encoder.finish()
}

fn build_report(
    input: &Path,
    output: &Path,
    source: &SourceSequence,
    reduction: &Reduction,
) -> Result<RenderReport> {
    let input_bytes = std::fs::metadata(input)
        .with_context(|| format!("failed to stat {}", input.display()))?
        .len();
    let output_bytes = std::fs::metadata(output)
        .with_context(|| format!("failed to stat {}", output.display()))?
        .len();

    Ok(derive_report(
        reduction,
        source.duration_seconds(),
        input_bytes,
        output_bytes,
    ))
}

/// Derive the report numbers from a completed reduction and artifact sizes.
fn derive_report(
    reduction: &Reduction,
    original_duration_seconds: f64,
    input_bytes: u64,
    output_bytes: u64,
) -> RenderReport {
    let report = reduction.report;
    let new_duration_seconds = if report.new_fps > 0.0 {
        report.new_frame_count as f64 / report.new_fps
    } else {
        0.0
    };
    let effective_fps = if new_duration_seconds > 0.0 {
        reduction.output.holds().len() as f64 / new_duration_seconds
    } else {
        0.0
    };
    let compression_ratio = if input_bytes > 0 {
        output_bytes as f64 / input_bytes as f64
    } else {
        0.0
    };

    RenderReport {
        reduction: report,
        effective_fps,
        original_duration_seconds,
        new_duration_seconds,
        input_bytes,
        output_bytes,
        compression_ratio,
    }
}
