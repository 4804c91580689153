//! Parenting diary engine.
//!
//! Parents upload photos through the day; an external vision-language service
//! writes a one-line caption for each, and at the end of the day a locally
//! hosted seq2seq model turns those captions into a single narrative entry.
//!
//! # Architecture
//!
//! - **Captions**: OpenAI-compatible chat completions with the photo inlined
//!   as a data URL ([`caption`])
//! - **Aggregation**: emoji-stripped, whitespace-normalized captions rendered as
//!   a numbered list ([`diary::summary`])
//! - **Narrative**: BART-family model exported to ONNX, tokenized with
//!   `tokenizers`, sampled step by step ([`runtime`])
//! - **Concurrency**: the model loads once on first use; inference runs on a
//!   bounded blocking pool so async callers stay responsive
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: Error taxonomy shared by both pipelines
//! - [`diary`]: Caption types, sanitizer, bullet aggregation, and the daily orchestrator
//! - [`runtime`]: Model loading, decoding, inference executor, and worker pool
//! - [`caption`]: External captioning and daily summary calls

pub mod caption;
pub mod config;
pub mod diary;
pub mod error;
pub mod runtime;

pub use error::{DiaryError, Result};
