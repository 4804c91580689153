//! CLI `caption` and `summarize` commands: calls to the external vision service.

use std::path::Path;

use aiary::caption::{CaptionSynthesizer, DEFAULT_CAPTION_INSTRUCTION};
use aiary::config::AiaryConfig;
use aiary::diary::types::parse_day;
use anyhow::{Context, Result};

/// Print one caption for the image at `image_path`.
pub async fn caption(config: &AiaryConfig, image_path: &Path, instruction: Option<&str>) -> Result<()> {
    let image = std::fs::read(image_path)
        .with_context(|| format!("failed to read {}", image_path.display()))?;
    anyhow::ensure!(!image.is_empty(), "{} is empty", image_path.display());

    let synthesizer = CaptionSynthesizer::new(config.vision.clone())?;
    let caption = synthesizer
        .synthesize_caption(&image, instruction.unwrap_or(DEFAULT_CAPTION_INSTRUCTION))
        .await
        .context("caption generation failed")?;

    println!("{caption}");
    Ok(())
}

/// Print the external service's free-form summary of one day's captions.
pub async fn summarize(config: &AiaryConfig, captions_path: &Path, date: &str) -> Result<()> {
    parse_day(date)?;
    let captions = super::read_captions(captions_path)?;
    let window = super::select_window("local", captions, Some(date))?;

    let synthesizer = CaptionSynthesizer::new(config.vision.clone())?;
    let summary = synthesizer
        .synthesize_daily_summary(&window.texts(), date)
        .await
        .context("daily summary failed")?;

    println!("{summary}");
    Ok(())
}
