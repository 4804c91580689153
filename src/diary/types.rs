//! Diary data types.
//!
//! [`Caption`] is one photo's one-line diary, [`AggregationWindow`] is the
//! chronologically ordered set of captions for one owner and one day, and
//! [`BulletSummary`] / [`GenerationResult`] are the derived, never-persisted
//! outputs of the generation pipeline.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DiaryError, Result};

/// A one-line caption produced for a single photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    /// When the photo was recorded.
    pub taken_at: NaiveDateTime,
    /// Opaque reference into the external photo store (e.g. `/media/images/x.jpg`).
    #[serde(default)]
    pub photo: Option<String>,
}

/// Captions for one owner within one calendar day, oldest first.
///
/// Construction guarantees the window is non-empty.
#[derive(Debug, Clone)]
pub struct AggregationWindow {
    owner: String,
    date: NaiveDate,
    captions: Vec<Caption>,
}

impl AggregationWindow {
    /// Build the window for `date` from an unordered set of captions.
    ///
    /// Captions outside the day are dropped; the rest are sorted ascending by
    /// `taken_at` (stable, so equal timestamps keep their input order).
    pub fn for_day(
        owner: impl Into<String>,
        date: NaiveDate,
        captions: impl IntoIterator<Item = Caption>,
    ) -> Result<Self> {
        let mut captions: Vec<Caption> = captions
            .into_iter()
            .filter(|c| c.taken_at.date() == date)
            .collect();
        if captions.is_empty() {
            return Err(DiaryError::EmptyInput);
        }
        captions.sort_by_key(|c| c.taken_at);

        Ok(Self {
            owner: owner.into(),
            date,
            captions,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Caption texts in chronological order.
    pub fn texts(&self) -> Vec<String> {
        self.captions.iter().map(|c| c.text.clone()).collect()
    }
}

/// Parse a `YYYY-MM-DD` day label.
pub fn parse_day(label: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(label.trim(), "%Y-%m-%d")
        .map_err(|_| DiaryError::InvalidInput(format!("date must be YYYY-MM-DD, got {label:?}")))
}

/// Numbered-list form of a window, used as the narrative model's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulletSummary {
    pub cleaned_sentences: Vec<String>,
    /// `"{n}. {sentence}"`, numbered contiguously from 1.
    pub bullet_lines: Vec<String>,
    /// `bullet_lines` joined by `\n`, without a trailing newline.
    pub combined_summary: String,
}

/// Output of one daily-diary generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub bullet_lines: Vec<String>,
    pub combined_summary: String,
    pub generated_narrative: String,
    /// Number of captions supplied, before empty ones were filtered out.
    pub source_count: usize,
}
