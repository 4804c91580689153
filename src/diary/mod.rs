//! Diary generation pipeline: sanitize → aggregate → narrate.

pub mod orchestrator;
pub mod sanitize;
pub mod summary;
pub mod types;

pub use orchestrator::DiaryGenerator;
pub use sanitize::sanitize;
pub use summary::build_summary;
pub use types::{AggregationWindow, BulletSummary, Caption, GenerationResult};
