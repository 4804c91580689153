#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aiary::config::GenerationConfig;
use aiary::diary::DiaryGenerator;
use aiary::error::{DiaryError, Result};
use aiary::runtime::executor::InferenceExecutor;
use aiary::runtime::pool::BlockingPool;
use aiary::runtime::{
    Device, EncodedInput, EncoderOutput, ModelRuntime, RuntimeHandle, RuntimeLoader,
    Seq2SeqModel, SpecialTokens, TokenCodec,
};

pub const BOS: u32 = 0;
pub const EOS: u32 = 1;
pub const PAD: u32 = 2;
/// Decodes to the literal `[DIARY]` marker.
pub const MARKER: u32 = 3;
pub const VOCAB: usize = 64;

pub const SPECIAL: SpecialTokens = SpecialTokens {
    eos: EOS,
    decoder_start: BOS,
    forced_bos: None,
};

/// Character-level codec: each char maps into the word range of the vocabulary.
pub struct FakeCodec {
    pub max_len: usize,
}

impl TokenCodec for FakeCodec {
    fn encode(&self, text: &str) -> Result<EncodedInput> {
        let mut input_ids: Vec<i64> = text
            .chars()
            .take(self.max_len)
            .map(|c| 4 + (c as i64 % (VOCAB as i64 - 4)))
            .collect();
        let mut attention_mask = vec![1i64; input_ids.len()];
        input_ids.resize(self.max_len, PAD as i64);
        attention_mask.resize(self.max_len, 0);
        Ok(EncodedInput {
            input_ids,
            attention_mask,
        })
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let words: Vec<String> = ids
            .iter()
            .filter(|&&id| id != BOS && id != EOS && id != PAD)
            .map(|&id| {
                if id == MARKER {
                    "[DIARY]".to_string()
                } else {
                    format!("w{id}")
                }
            })
            .collect();
        Ok(words.join(" "))
    }
}

/// Emits the marker first, then words, and strongly prefers EOS whenever allowed.
pub struct FakeModel {
    pub step_delay: Duration,
    pub steps: Arc<AtomicUsize>,
}

impl Seq2SeqModel for FakeModel {
    fn encode(&self, input: &EncodedInput) -> Result<EncoderOutput> {
        Ok(EncoderOutput {
            hidden_states: input.input_ids.iter().map(|&id| id as f32).collect(),
            shape: vec![1, input.input_ids.len() as i64, 1],
            attention_mask: input.attention_mask.clone(),
        })
    }

    fn next_token_logits(&self, _encoded: &EncoderOutput, decoder_ids: &[u32]) -> Result<Vec<f32>> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }
        let mut logits = vec![1.0f32; VOCAB];
        logits[BOS as usize] = f32::NEG_INFINITY;
        logits[PAD as usize] = f32::NEG_INFINITY;
        logits[EOS as usize] = 8.0;
        if decoder_ids.len() == 1 {
            logits[MARKER as usize] = 6.0;
        }
        Ok(logits)
    }
}

/// Builds fake handles and counts how many times it was asked to.
#[derive(Clone)]
pub struct CountingLoader {
    pub loads: Arc<AtomicUsize>,
    pub steps: Arc<AtomicUsize>,
    pub load_delay: Duration,
    pub step_delay: Duration,
    pub max_len: usize,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            steps: Arc::new(AtomicUsize::new(0)),
            load_delay: Duration::from_millis(50),
            step_delay: Duration::ZERO,
            max_len: 256,
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn step_count(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }
}

impl RuntimeLoader for CountingLoader {
    fn load(&self) -> Result<RuntimeHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        Ok(RuntimeHandle {
            codec: Box::new(FakeCodec {
                max_len: self.max_len,
            }),
            model: Box::new(FakeModel {
                step_delay: self.step_delay,
                steps: Arc::clone(&self.steps),
            }),
            special: SPECIAL,
            device: Device::Cpu,
        })
    }
}

/// Always fails like a deployment with no model directory.
pub struct MissingModelLoader {
    pub attempts: Arc<AtomicUsize>,
}

impl RuntimeLoader for MissingModelLoader {
    fn load(&self) -> Result<RuntimeHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DiaryError::ModelNotFound("/nonexistent/model".into()))
    }
}

/// Default decoding parameters with a fixed seed.
pub fn seeded_config() -> GenerationConfig {
    GenerationConfig {
        seed: Some(7),
        ..GenerationConfig::default()
    }
}

pub fn generator_with(loader: CountingLoader, max_jobs: usize) -> DiaryGenerator {
    let runtime = Arc::new(ModelRuntime::new(loader));
    let executor = Arc::new(InferenceExecutor::new(runtime, seeded_config()));
    DiaryGenerator::new(executor, BlockingPool::new(max_jobs))
}
