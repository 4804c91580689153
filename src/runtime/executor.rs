//! Inference executor: combined summary → narrative diary text.
//!
//! Blocking. Call from a worker thread (see [`super::pool::BlockingPool`]),
//! never directly from an async task.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use super::decoding::decode_sequence;
use super::ModelRuntime;
use crate::config::GenerationConfig;
use crate::error::Result;

pub const SUMMARY_MARKER: &str = "[SUMMARY]";
pub const DIARY_MARKER: &str = "[DIARY]";

/// Wrap a combined summary in the template the model was fine-tuned on.
pub fn build_prompt(combined_summary: &str) -> String {
    format!("{SUMMARY_MARKER}\n{combined_summary}\n{DIARY_MARKER}")
}

/// Remove template markers the model may echo back and trim.
pub fn clean_narrative(decoded: &str) -> String {
    decoded
        .replace(DIARY_MARKER, "")
        .replace(SUMMARY_MARKER, "")
        .trim()
        .to_string()
}

pub struct InferenceExecutor {
    runtime: Arc<ModelRuntime>,
    config: GenerationConfig,
}

impl InferenceExecutor {
    pub fn new(runtime: Arc<ModelRuntime>, config: GenerationConfig) -> Self {
        Self { runtime, config }
    }

    /// Generate a narrative for `combined_summary`, loading the model if needed.
    pub fn generate_narrative(&self, combined_summary: &str) -> Result<String> {
        self.generate_narrative_with(combined_summary, &CancellationToken::new())
    }

    /// Like [`generate_narrative`](Self::generate_narrative), but stops between
    /// decoder steps once `cancel` fires.
    pub fn generate_narrative_with(
        &self,
        combined_summary: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let handle = self.runtime.ensure_loaded()?;
        let started = Instant::now();

        let encoded = handle.codec.encode(&build_prompt(combined_summary))?;
        let encoder_output = handle.model.encode(&encoded)?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ids = decode_sequence(&handle.special, &self.config, &mut rng, cancel, |decoder_ids| {
            handle.model.next_token_logits(&encoder_output, decoder_ids)
        })?;

        let narrative = clean_narrative(&handle.codec.decode(&ids)?);

        tracing::info!(
            generated_tokens = ids.len(),
            narrative_chars = narrative.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "narrative generated"
        );
        Ok(narrative)
    }
}
