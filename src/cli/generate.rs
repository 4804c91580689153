//! CLI `generate` command: build a day's window and run the narrative model.

use std::path::Path;

use aiary::config::AiaryConfig;
use aiary::diary::DiaryGenerator;
use anyhow::{Context, Result};

pub async fn generate(
    config: &AiaryConfig,
    captions_path: &Path,
    date: Option<&str>,
    owner: &str,
) -> Result<()> {
    let captions = super::read_captions(captions_path)?;
    let window = super::select_window(owner, captions, date)?;

    let generator = DiaryGenerator::from_config(config);
    let result = generator
        .generate_for_window(&window)
        .await
        .context("daily diary generation failed")?;

    let output = serde_json::json!({
        "owner": window.owner(),
        "date": window.date().to_string(),
        "bullet_lines": result.bullet_lines,
        "combined_summary": result.combined_summary,
        "full_diary": result.generated_narrative,
        "source_count": result.source_count,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
