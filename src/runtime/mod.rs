//! Local narrative model runtime.
//!
//! A [`RuntimeHandle`] bundles a tokenizer, a seq2seq model and the compute
//! device it was placed on. [`ModelRuntime`] builds that handle lazily
//! through a [`RuntimeLoader`] the first time it is needed and hands out the
//! same `Arc` afterwards. The production loader lives in [`onnx`]; tests plug
//! in fakes through the same traits.
//!
//! Everything here is synchronous and CPU/accelerator bound. Async callers
//! go through [`pool::BlockingPool`].

pub mod decoding;
pub mod executor;
pub mod onnx;
pub mod pool;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::error::Result;

/// Fixed-length encoder input for a single sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

/// Encoder activations kept alive across decoder steps.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Flattened `[1, seq_len, hidden]` hidden states.
    pub hidden_states: Vec<f32>,
    pub shape: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

/// Text ↔ token ids. Padding and truncation are fixed when the codec is built.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Result<EncodedInput>;

    /// Decode generated ids, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// An encoder-decoder model driven one decoder step at a time.
pub trait Seq2SeqModel: Send + Sync {
    fn encode(&self, input: &EncodedInput) -> Result<EncoderOutput>;

    /// Logits over the vocabulary for the position after `decoder_ids`.
    fn next_token_logits(&self, encoded: &EncoderOutput, decoder_ids: &[u32]) -> Result<Vec<f32>>;
}

/// Ids the decoding loop needs to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos: u32,
    pub decoder_start: u32,
    pub forced_bos: Option<u32>,
}

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda { device_id: i32 },
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda { device_id } => write!(f, "cuda:{device_id}"),
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

/// A loaded tokenizer + model + device. Read-only once built.
pub struct RuntimeHandle {
    pub codec: Box<dyn TokenCodec>,
    pub model: Box<dyn Seq2SeqModel>,
    pub special: SpecialTokens,
    pub device: Device,
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("special", &self.special)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Builds a [`RuntimeHandle`] from whatever backs it (files on disk, fakes).
pub trait RuntimeLoader: Send + Sync {
    fn load(&self) -> Result<RuntimeHandle>;
}

/// Load-once holder for the process's [`RuntimeHandle`].
///
/// Concurrent first callers block on the same initialization; the loader
/// runs at most once per successful load. A failed load is not cached, so a
/// later call after the deployment is fixed will try again.
pub struct ModelRuntime {
    loader: Box<dyn RuntimeLoader>,
    handle: OnceCell<Arc<RuntimeHandle>>,
}

impl ModelRuntime {
    pub fn new(loader: impl RuntimeLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            handle: OnceCell::new(),
        }
    }

    /// Return the loaded handle, loading it on first use.
    pub fn ensure_loaded(&self) -> Result<Arc<RuntimeHandle>> {
        self.handle
            .get_or_try_init(|| {
                tracing::info!("loading narrative model");
                let started = Instant::now();
                let handle = self.loader.load()?;
                tracing::info!(
                    device = %handle.device,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "narrative model loaded"
                );
                Ok(Arc::new(handle))
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }
}

impl fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
