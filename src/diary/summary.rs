//! Bullet aggregation: a day's captions → numbered list for the narrative model.

use once_cell::sync::Lazy;
use regex::Regex;

use super::sanitize::sanitize;
use super::types::BulletSummary;
use crate::error::{DiaryError, Result};

/// A list marker the caption may already carry, e.g. `"1. "` or `"2) "`.
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3})[.)](?:\s+|$)").expect("list marker pattern is valid"));

/// Sanitize, drop empties, and renumber `captions` from 1.
///
/// Numbering is assigned after filtering, so it is always contiguous and
/// follows the input order. A caption that already starts with its own
/// 1-based position as a list marker (`"2. "` as the second caption) loses
/// that marker; any other leading number is caption text and is kept.
/// Fails with [`DiaryError::EmptyInput`] when no caption has usable text.
pub fn build_summary<S: AsRef<str>>(captions: &[S]) -> Result<BulletSummary> {
    let cleaned_sentences: Vec<String> = captions
        .iter()
        .enumerate()
        .map(|(i, c)| clean_sentence(c.as_ref(), i + 1))
        .filter(|s| !s.is_empty())
        .collect();

    if cleaned_sentences.is_empty() {
        return Err(DiaryError::EmptyInput);
    }

    let bullet_lines: Vec<String> = cleaned_sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| format!("{}. {sentence}", i + 1))
        .collect();
    let combined_summary = bullet_lines.join("\n");

    Ok(BulletSummary {
        cleaned_sentences,
        bullet_lines,
        combined_summary,
    })
}

fn clean_sentence(caption: &str, position: usize) -> String {
    let text = sanitize(caption);
    let marker_len = LIST_MARKER
        .captures(&text)
        .filter(|caps| caps[1].parse::<usize>().ok() == Some(position))
        .map(|caps| caps[0].len());
    match marker_len {
        Some(len) => text[len..].trim().to_string(),
        None => text,
    }
}
