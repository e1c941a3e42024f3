mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use stopmo_core::enhance::EnhanceOptions;
use stopmo_core::extract::{self, ExtractConfig};
use stopmo_core::pipeline::{self, RenderConfig, RenderMode, RenderReport};
use stopmo_core::timing::TimelineSpec;
use stopmo_core::video::decoder;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Render {
            input,
            output,
            factor,
            preset,
            no_maintain_duration,
            enhance,
            quality,
            report,
        } => {
            // clap guarantees exactly one of --factor / --preset is present.
            let factor = factor
                .or_else(|| preset.map(cli::Preset::factor))
                .context("either --factor or --preset is required")?;

            info!(?input, ?output, factor, maintain_duration = !no_maintain_duration, "starting render");

            let config = RenderConfig {
                mode: RenderMode::Factor {
                    factor,
                    maintain_duration: !no_maintain_duration,
                },
                enhance: enhance.then(EnhanceOptions::default),
                quality: quality.into(),
            };

            let result = pipeline::render_video(&input, &output, &config)?;
            finish_render(&result, report.as_deref())
        }

        cli::Command::Timeline {
            input,
            output,
            config,
            enhance,
            quality,
            report,
        } => {
            let timeline = TimelineSpec::load(&config)?;

            info!(?input, ?output, entries = timeline.entries.len(), "starting timeline render");

            let config = RenderConfig {
                mode: RenderMode::Timeline(timeline),
                enhance: enhance.then(EnhanceOptions::default),
                quality: quality.into(),
            };

            let result = pipeline::render_video(&input, &output, &config)?;
            finish_render(&result, report.as_deref())
        }

        cli::Command::Extract {
            input,
            out_dir,
            factor,
            thumbnail_width,
        } => {
            let config = ExtractConfig {
                factor,
                thumbnail_width,
            };
            let draft = extract::extract_timeline(&input, &out_dir, &config)?;

            info!(
                extracted_frames = draft.entries.len(),
                ?out_dir,
                "extraction complete — edit timeline.json and pass it to `stopmo timeline`"
            );
            Ok(())
        }

        cli::Command::Info { input } => {
            let info = decoder::probe(&input)?;
            println!("width:       {}", info.width);
            println!("height:      {}", info.height);
            println!("fps:         {:.3}", info.fps);
            match info.frame_count {
                Some(n) => println!("frames:      {n}"),
                None => println!("frames:      unknown"),
            }
            match info.duration_seconds() {
                Some(d) => println!("duration:    {d:.2}s"),
                None => println!("duration:    unknown"),
            }
            Ok(())
        }
    }
}

/// Log the render outcome and optionally persist the JSON report.
fn finish_render(result: &RenderReport, report_path: Option<&Path>) -> Result<()> {
    info!(
        original_fps = result.reduction.original_fps,
        new_fps = result.reduction.new_fps,
        effective_fps = result.effective_fps,
        original_frames = result.reduction.original_frame_count,
        new_frames = result.reduction.new_frame_count,
        compression_ratio = format!("{:.2}", result.compression_ratio),
        "render finished"
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(result).context("failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(?path, "report written");
    }

    Ok(())
}
