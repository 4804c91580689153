//! Daily diary generation: captions → bullet summary → narrative.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::summary::build_summary;
use super::types::{AggregationWindow, GenerationResult};
use crate::config::AiaryConfig;
use crate::error::Result;
use crate::runtime::executor::InferenceExecutor;
use crate::runtime::onnx::OnnxRuntimeLoader;
use crate::runtime::pool::BlockingPool;
use crate::runtime::ModelRuntime;

/// Drives aggregation and narrative inference for one day at a time.
///
/// Cheap to clone; clones share the model runtime and worker pool.
#[derive(Clone)]
pub struct DiaryGenerator {
    executor: Arc<InferenceExecutor>,
    pool: BlockingPool,
}

impl DiaryGenerator {
    pub fn new(executor: Arc<InferenceExecutor>, pool: BlockingPool) -> Self {
        Self { executor, pool }
    }

    /// Wire the ONNX-backed runtime from config. The model loads on first use.
    pub fn from_config(config: &AiaryConfig) -> Self {
        let runtime = Arc::new(ModelRuntime::new(OnnxRuntimeLoader::from_config(config)));
        let executor = Arc::new(InferenceExecutor::new(runtime, config.generation.clone()));
        Self::new(executor, BlockingPool::new(config.worker.max_concurrent_jobs))
    }

    /// Summarize `captions` (oldest first) and generate the day's narrative.
    ///
    /// Inference runs on the blocking pool. Dropping the returned future
    /// cancels the in-flight generation at its next decoder step.
    pub async fn generate_daily_diary<S: AsRef<str>>(&self, captions: &[S]) -> Result<GenerationResult> {
        let summary = build_summary(captions)?;
        tracing::info!(
            source_count = captions.len(),
            bullets = summary.bullet_lines.len(),
            "generating daily diary"
        );

        let cancel = CancellationToken::new();
        let _abandon_guard = cancel.clone().drop_guard();

        let executor = Arc::clone(&self.executor);
        let combined = summary.combined_summary.clone();
        let narrative = self
            .pool
            .run(move || executor.generate_narrative_with(&combined, &cancel))
            .await?;

        Ok(GenerationResult {
            bullet_lines: summary.bullet_lines,
            combined_summary: summary.combined_summary,
            generated_narrative: narrative,
            source_count: captions.len(),
        })
    }

    /// [`generate_daily_diary`](Self::generate_daily_diary) over a window's captions.
    pub async fn generate_for_window(&self, window: &AggregationWindow) -> Result<GenerationResult> {
        tracing::debug!(owner = window.owner(), date = %window.date(), "window selected");
        self.generate_daily_diary(&window.texts()).await
    }
}
