//! ONNX Runtime backend for the narrative model.
//!
//! Expects a BART-family seq2seq export in one directory: `tokenizer.json`,
//! `encoder_model.onnx`, `decoder_model.onnx` and `config.json`, plus an
//! optional `tokenizer_config.json` / `special_tokens_map.json` declaring the
//! pad and EOS tokens. The decoder is run without a KV cache, re-feeding the
//! whole decoder sequence each step.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::{
    Device, EncodedInput, EncoderOutput, RuntimeHandle, RuntimeLoader, Seq2SeqModel,
    SpecialTokens, TokenCodec,
};
use crate::config::{AiaryConfig, GenerationConfig, ModelConfig};
use crate::error::{DiaryError, Result};

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const ENCODER_FILE: &str = "encoder_model.onnx";
pub const DECODER_FILE: &str = "decoder_model.onnx";
pub const MODEL_CONFIG_FILE: &str = "config.json";

/// Files that must be present for [`OnnxRuntimeLoader::load`] to succeed.
pub const REQUIRED_FILES: [&str; 4] = [TOKENIZER_FILE, ENCODER_FILE, DECODER_FILE, MODEL_CONFIG_FILE];

/// Searched in order; the first file declaring a token wins.
const SPECIAL_TOKEN_FILES: [&str; 2] = ["tokenizer_config.json", "special_tokens_map.json"];

const DEFAULT_EOS_TOKEN: &str = "</s>";

/// Loads the tokenizer and encoder/decoder sessions from a model directory.
#[derive(Debug, Clone)]
pub struct OnnxRuntimeLoader {
    model_dir: PathBuf,
    intra_threads: usize,
    prefer_accelerator: bool,
    max_input_tokens: usize,
}

impl OnnxRuntimeLoader {
    pub fn new(model_dir: impl Into<PathBuf>, model: &ModelConfig, generation: &GenerationConfig) -> Self {
        Self {
            model_dir: model_dir.into(),
            intra_threads: model.intra_threads,
            prefer_accelerator: model.prefer_accelerator,
            max_input_tokens: generation.max_input_tokens,
        }
    }

    pub fn from_config(config: &AiaryConfig) -> Self {
        Self::new(config.resolved_model_dir(), &config.model, &config.generation)
    }

    fn load_artifacts(&self) -> anyhow::Result<RuntimeHandle> {
        let dir = &self.model_dir;
        let model_config = read_model_config(&dir.join(MODEL_CONFIG_FILE))?;
        let (codec, eos_id) = build_codec(dir, self.max_input_tokens, model_config.eos_token_id)?;

        let device = select_device(self.prefer_accelerator);
        let encoder = build_session(&dir.join(ENCODER_FILE), device, self.intra_threads)?;
        let decoder = build_session(&dir.join(DECODER_FILE), device, self.intra_threads)?;
        tracing::info!(model_dir = %dir.display(), device = %device, "ONNX sessions ready");

        Ok(RuntimeHandle {
            codec: Box::new(codec),
            model: Box::new(OnnxSeq2Seq {
                encoder: Mutex::new(encoder),
                decoder: Mutex::new(decoder),
            }),
            special: SpecialTokens {
                eos: eos_id,
                decoder_start: model_config.decoder_start_token_id.unwrap_or(eos_id),
                forced_bos: model_config.forced_bos_token_id,
            },
            device,
        })
    }
}

impl RuntimeLoader for OnnxRuntimeLoader {
    fn load(&self) -> Result<RuntimeHandle> {
        if !self.model_dir.is_dir() {
            return Err(DiaryError::ModelNotFound(self.model_dir.clone()));
        }
        self.load_artifacts()
            .map_err(|e| DiaryError::ModelLoad(format!("{e:#}")))
    }
}

/// Required artifacts absent from `dir`.
pub fn missing_artifacts(dir: &Path) -> Vec<&'static str> {
    REQUIRED_FILES
        .iter()
        .copied()
        .filter(|name| !dir.join(name).is_file())
        .collect()
}

/// Pick the pad token: the declared one, or the EOS token when none is declared.
pub fn resolve_pad_token(declared: Option<String>, eos_token: &str) -> String {
    declared.unwrap_or_else(|| eos_token.to_string())
}

/// Accelerator when compiled in and reported available, else CPU.
pub fn select_device(prefer_accelerator: bool) -> Device {
    #[cfg(feature = "cuda")]
    if prefer_accelerator {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => return Device::Cuda { device_id: 0 },
            Ok(false) => tracing::info!("CUDA execution provider unavailable, using CPU"),
            Err(e) => tracing::warn!(error = %e, "failed to probe CUDA execution provider"),
        }
    }
    #[cfg(not(feature = "cuda"))]
    let _ = prefer_accelerator;
    Device::Cpu
}

fn build_session(path: &Path, device: Device, intra_threads: usize) -> anyhow::Result<Session> {
    anyhow::ensure!(path.is_file(), "ONNX model not found at {}", path.display());

    #[allow(unused_mut)]
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?;

    #[cfg(feature = "cuda")]
    if let Device::Cuda { device_id } = device {
        use ort::execution_providers::CUDAExecutionProvider;
        builder = builder.with_execution_providers([CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .build()])?;
    }
    #[cfg(not(feature = "cuda"))]
    let _ = device;

    let session = builder
        .commit_from_file(path)
        .with_context(|| format!("failed to load ONNX model {}", path.display()))?;
    tracing::info!(model = %path.display(), "ONNX model loaded");
    Ok(session)
}

#[derive(Debug, Default, Deserialize)]
struct Seq2SeqModelConfig {
    #[serde(default)]
    eos_token_id: Option<u32>,
    #[serde(default)]
    decoder_start_token_id: Option<u32>,
    #[serde(default)]
    forced_bos_token_id: Option<u32>,
}

fn read_model_config(path: &Path) -> anyhow::Result<Seq2SeqModelConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// `pad_token` / `eos_token` may be a bare string or an added-token object.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
enum TokenSpec {
    Plain(String),
    Added { content: String },
}

impl TokenSpec {
    fn into_content(self) -> String {
        match self {
            Self::Plain(s) | Self::Added { content: s } => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SpecialTokenConfig {
    #[serde(default)]
    pad_token: Option<TokenSpec>,
    #[serde(default)]
    eos_token: Option<TokenSpec>,
}

fn read_special_token_config(dir: &Path) -> anyhow::Result<SpecialTokenConfig> {
    let mut merged = SpecialTokenConfig::default();
    for name in SPECIAL_TOKEN_FILES {
        let path = dir.join(name);
        if !path.is_file() {
            continue;
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let parsed: SpecialTokenConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        merged.pad_token = merged.pad_token.or(parsed.pad_token);
        merged.eos_token = merged.eos_token.or(parsed.eos_token);
    }
    Ok(merged)
}

/// Load `tokenizer.json` from `dir` and set it up for fixed-length encoding.
///
/// Inputs are truncated and padded to `max_input_tokens`. The pad token is
/// the declared one, or the EOS token when the model directory declares
/// none. `eos_token_id` from `config.json` takes precedence over the EOS
/// token's vocabulary id. Returns the codec and the resolved EOS id.
fn build_codec(
    dir: &Path,
    max_input_tokens: usize,
    eos_token_id: Option<u32>,
) -> anyhow::Result<(HfTokenCodec, u32)> {
    let token_config = read_special_token_config(dir)?;

    let tokenizer_path = dir.join(TOKENIZER_FILE);
    let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("failed to load tokenizer {}: {e}", tokenizer_path.display()))?;

    let eos_token = token_config
        .eos_token
        .map(TokenSpec::into_content)
        .unwrap_or_else(|| DEFAULT_EOS_TOKEN.to_string());
    let declared_pad = token_config.pad_token.map(TokenSpec::into_content);
    let substituted = declared_pad.is_none();
    let pad_token = resolve_pad_token(declared_pad, &eos_token);
    if substituted {
        tracing::warn!(pad_token = %pad_token, "tokenizer declares no pad token, using EOS");
    }

    let pad_id = tokenizer
        .token_to_id(&pad_token)
        .with_context(|| format!("pad token {pad_token:?} is not in the vocabulary"))?;
    let eos_id = eos_token_id
        .or_else(|| tokenizer.token_to_id(&eos_token))
        .with_context(|| format!("EOS token {eos_token:?} is not in the vocabulary"))?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_input_tokens,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("failed to set truncation: {e}"))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::Fixed(max_input_tokens),
        pad_id,
        pad_token,
        ..Default::default()
    }));
    tracing::info!(tokenizer = %tokenizer_path.display(), pad_id, eos_id, "tokenizer loaded");

    Ok((HfTokenCodec { tokenizer }, eos_id))
}

/// `tokenizers` wrapper with fixed-length padding and truncation.
struct HfTokenCodec {
    tokenizer: Tokenizer,
}

impl TokenCodec for HfTokenCodec {
    fn encode(&self, text: &str) -> Result<EncodedInput> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| DiaryError::Inference(format!("tokenization failed: {e}")))?;
        Ok(EncodedInput {
            input_ids: encoding.get_ids().iter().map(|&id| id as i64).collect(),
            attention_mask: encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect(),
        })
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| DiaryError::Inference(format!("decoding failed: {e}")))
    }
}

struct OnnxSeq2Seq {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
}

// Safety: each Session is behind a Mutex, which guarantees exclusive access during run().
unsafe impl Send for OnnxSeq2Seq {}
unsafe impl Sync for OnnxSeq2Seq {}

impl OnnxSeq2Seq {
    fn run_encoder(&self, input: &EncodedInput) -> anyhow::Result<EncoderOutput> {
        let shape = vec![1i64, input.input_ids.len() as i64];
        let input_ids =
            Tensor::from_array((shape.clone(), input.input_ids.clone().into_boxed_slice()))?;
        let attention_mask =
            Tensor::from_array((shape, input.attention_mask.clone().into_boxed_slice()))?;

        let mut session = self
            .encoder
            .lock()
            .map_err(|e| anyhow!("encoder lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        })?;

        let hidden = outputs
            .get("last_hidden_state")
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract encoder hidden states")?;
        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3,
            "unexpected encoder output shape: {dims:?}, expected [batch, seq, hidden]"
        );

        Ok(EncoderOutput {
            hidden_states: data.to_vec(),
            shape: dims.to_vec(),
            attention_mask: input.attention_mask.clone(),
        })
    }

    fn run_decoder(&self, encoded: &EncoderOutput, decoder_ids: &[u32]) -> anyhow::Result<Vec<f32>> {
        let ids: Vec<i64> = decoder_ids.iter().map(|&id| id as i64).collect();
        let input_ids = Tensor::from_array((vec![1i64, ids.len() as i64], ids.into_boxed_slice()))?;
        let hidden_states = Tensor::from_array((
            encoded.shape.clone(),
            encoded.hidden_states.clone().into_boxed_slice(),
        ))?;
        let encoder_mask = Tensor::from_array((
            vec![1i64, encoded.attention_mask.len() as i64],
            encoded.attention_mask.clone().into_boxed_slice(),
        ))?;

        let mut session = self
            .decoder
            .lock()
            .map_err(|e| anyhow!("decoder lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "encoder_hidden_states" => hidden_states,
            "encoder_attention_mask" => encoder_mask,
        })?;

        let logits = outputs.get("logits").unwrap_or_else(|| &outputs[0]);
        let (shape, data) = logits
            .try_extract_tensor::<f32>()
            .context("failed to extract decoder logits")?;
        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[1] >= 1,
            "unexpected logits shape: {dims:?}, expected [batch, seq, vocab]"
        );

        // Only the last position matters for the next token.
        let vocab = dims[2] as usize;
        let start = (dims[1] as usize - 1) * vocab;
        Ok(data[start..start + vocab].to_vec())
    }
}

impl Seq2SeqModel for OnnxSeq2Seq {
    fn encode(&self, input: &EncodedInput) -> Result<EncoderOutput> {
        self.run_encoder(input)
            .map_err(|e| DiaryError::Inference(format!("{e:#}")))
    }

    fn next_token_logits(&self, encoded: &EncoderOutput, decoder_ids: &[u32]) -> Result<Vec<f32>> {
        self.run_decoder(encoded, decoder_ids)
            .map_err(|e| DiaryError::Inference(format!("{e:#}")))
    }
}
