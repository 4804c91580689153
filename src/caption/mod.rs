//! Per-photo captions and free-form daily summaries from an external
//! multimodal chat-completions service.
//!
//! Independent of the local narrative model: same inputs (photos, captions),
//! different backend. Every call resolves the API key from the environment
//! first and fails with [`DiaryError::MissingCredential`] before touching the
//! network if it is unset. No retries; requests are bounded by
//! `vision.timeout_secs`.

pub mod client;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::VisionConfig;
use crate::error::{DiaryError, Result};
use client::{ChatClient, ChatMessage, CompletionParams};

/// Instruction used for one-line captions when the caller supplies none.
pub const DEFAULT_CAPTION_INSTRUCTION: &str = "위 이미지를 보고 오늘 있었던 순간을 떠올리듯이 \
아이의 감정, 행동을 파악하고, 주변 사물로 상황을 파악하여 \
한국어로 25자 이내의 감성적인 한 줄 일기를 한 문장만 써줘. \
문장에 이모지를 적극적으로 활용하세요.";

const CAPTION_SYSTEM_PROMPT: &str = "너는 부모를 위한 육아 일기 도우미야. \
아기 또는 아이의 사진을 보고 오늘 있었던 순간을 떠올리듯이, \
감성적인 한국어 한 줄 일기를 만들어주는 역할을 한다.";

const SUMMARY_SYSTEM_PROMPT: &str = "너는 부모를 위한 육아 일기 요약 도우미야. \
하루 동안 찍은 아이 사진들에 대해 이미 생성된 '한 줄 일기'들을 바탕으로, \
부모가 하루를 회상하며 읽을 수 있는 감성적인 한국어 일기를 작성해줘. \
말투는 따뜻하고 부드럽게, 일기 형식의 문단 1~2개 정도로 만들어.";

pub struct CaptionSynthesizer {
    client: ChatClient,
    config: VisionConfig,
}

impl CaptionSynthesizer {
    pub fn new(config: VisionConfig) -> Result<Self> {
        let client = ChatClient::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self { client, config })
    }

    /// One short caption for `image` following `instruction`.
    pub async fn synthesize_caption(&self, image: &[u8], instruction: &str) -> Result<String> {
        if image.is_empty() {
            return Err(DiaryError::InvalidInput("image is empty".into()));
        }
        let api_key = self.api_key()?;

        let messages = [
            ChatMessage::system(CAPTION_SYSTEM_PROMPT),
            ChatMessage::user_with_image(instruction, image_data_url(image)),
        ];
        let params = CompletionParams {
            max_tokens: self.config.caption_max_tokens,
            temperature: self.config.temperature,
        };

        tracing::info!(
            model = self.client.model(),
            image_bytes = image.len(),
            "requesting caption"
        );
        self.client.complete(&api_key, &messages, params).await
    }

    /// A paragraph-length diary for `date_label` written from the day's captions.
    pub async fn synthesize_daily_summary<S: AsRef<str>>(
        &self,
        captions: &[S],
        date_label: &str,
    ) -> Result<String> {
        if captions.is_empty() {
            return Err(DiaryError::EmptyInput);
        }
        let api_key = self.api_key()?;

        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(summary_prompt(captions, date_label)),
        ];
        let params = CompletionParams {
            max_tokens: self.config.summary_max_tokens,
            temperature: self.config.temperature,
        };

        tracing::info!(
            model = self.client.model(),
            captions = captions.len(),
            date = date_label,
            "requesting daily summary"
        );
        self.client.complete(&api_key, &messages, params).await
    }

    fn api_key(&self) -> Result<String> {
        resolve_api_key(&self.config.api_key_env)
    }
}

/// Read the API key from `var`; unset or blank is a missing credential.
pub fn resolve_api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(DiaryError::MissingCredential(var.to_string())),
    }
}

/// User prompt for the daily summary: a date header and one `- caption` line each.
pub fn summary_prompt<S: AsRef<str>>(captions: &[S], date_label: &str) -> String {
    let joined = captions
        .iter()
        .map(|c| format!("- {}", c.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "날짜: {date_label}\n\n\
         아래는 이 날에 대한 한 줄 일기 목록이야.\n\
         이 한 줄 일기들을 바탕으로 하루를 정리하는 줄글 일기를 작성해줘.\n\n\
         {joined}"
    )
}

/// `data:` URL with the MIME type sniffed from magic bytes.
pub fn image_data_url(image: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_image_mime(image), STANDARD.encode(image))
}

/// Best-effort MIME type from file signature; unknown formats report JPEG.
pub fn sniff_image_mime(image: &[u8]) -> &'static str {
    match image {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}
