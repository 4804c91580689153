pub mod caption;
pub mod doctor;
pub mod generate;

use aiary::diary::types::{parse_day, AggregationWindow, Caption};
use anyhow::{Context, Result};
use std::path::Path;

/// Read a JSON array of caption records exported from the diary store.
pub fn read_captions(path: &Path) -> Result<Vec<Caption>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse captions in {}", path.display()))
}

/// Build the window for `date`, or for the earliest caption's day if unset.
pub fn select_window(
    owner: &str,
    captions: Vec<Caption>,
    date: Option<&str>,
) -> Result<AggregationWindow> {
    let day = match date {
        Some(label) => parse_day(label)?,
        None => captions
            .iter()
            .map(|c| c.taken_at.date())
            .min()
            .context("caption file is empty")?,
    };
    AggregationWindow::for_day(owner, day, captions)
        .with_context(|| format!("no captions recorded on {day}"))
}
