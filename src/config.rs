use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AiaryConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub generation: GenerationConfig,
    pub worker: WorkerConfig,
    pub vision: VisionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

/// Where the narrative model lives and how its sessions are built.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: String,
    pub intra_threads: usize,
    pub prefer_accelerator: bool,
}

/// Decoding parameters for the narrative model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Fixed encoder input length (padded and truncated to this).
    pub max_input_tokens: usize,
    pub max_new_tokens: usize,
    /// Minimum number of generated tokens before EOS may be sampled.
    pub min_length: usize,
    pub no_repeat_ngram_size: usize,
    pub repetition_penalty: f32,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    /// Fixed RNG seed. `None` seeds from OS entropy on every call.
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on inference jobs running at once.
    pub max_concurrent_jobs: usize,
}

/// External multimodal chat-completions service.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub caption_max_tokens: u32,
    pub summary_max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let dir = default_aiary_dir()
            .join("models")
            .join("day_diary_from_summary_v2")
            .to_string_lossy()
            .into_owned();
        Self {
            dir,
            intra_threads: 4,
            prefer_accelerator: true,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 256,
            max_new_tokens: 220,
            min_length: 40,
            no_repeat_ngram_size: 3,
            repetition_penalty: 2.0,
            do_sample: true,
            temperature: 0.6,
            top_p: 0.9,
            seed: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4.1-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            caption_max_tokens: 64,
            summary_max_tokens: 512,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

/// Returns `~/.aiary/`
pub fn default_aiary_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aiary")
}

/// Returns the default config file path: `~/.aiary/config.toml`
pub fn default_config_path() -> PathBuf {
    default_aiary_dir().join("config.toml")
}

impl AiaryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AiaryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (AIARY_MODEL_DIR, AIARY_LOG_LEVEL,
    /// AIARY_VISION_BASE_URL, AIARY_VISION_MODEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AIARY_MODEL_DIR") {
            self.model.dir = val;
        }
        if let Ok(val) = std::env::var("AIARY_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("AIARY_VISION_BASE_URL") {
            self.vision.base_url = val;
        }
        if let Ok(val) = std::env::var("AIARY_VISION_MODEL") {
            self.vision.model = val;
        }
    }

    /// Resolve the model directory, expanding `~` if needed.
    pub fn resolved_model_dir(&self) -> PathBuf {
        expand_tilde(&self.model.dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
