//! Remote model calls: embeddings, image captioning, audio transcription.
//!
//! Everything goes through one OpenAI-style HTTP client using blocking
//! reqwest with an explicit timeout; handlers run these behind
//! `tokio::task::block_in_place`. Each concern sits behind its own trait so
//! the ingestion pipeline can be exercised without the network.

use crate::config::OpenAiConfig;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CAPTION_PROMPT: &str = "Describe this image in detail.";

/// Maps canonical text to a fixed-length dense vector.
///
/// Repeated calls with identical text may return numerically distinct
/// vectors (upstream model non-determinism); callers must not assume
/// embedding equality implies text equality or vice versa.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimensions(&self) -> usize;
}

pub trait Captioner: Send + Sync {
    fn caption(&self, image: &[u8]) -> anyhow::Result<String>;
}

pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &[u8], filename: &str) -> anyhow::Result<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding input is empty")]
    EmptyInput,

    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("embedding response malformed: {0}")]
    Malformed(String),

    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    embedding_model: String,
    embedding_dimensions: usize,
    caption_model: String,
    transcription_model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self {
            api_key: config.resolved_api_key(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
            caption_model: config.caption_model.clone(),
            transcription_model: config.transcription_model.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn client(&self) -> Result<reqwest::blocking::Client, reqwest::Error> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
    }

    /// Reject vectors the upstream should never produce: wrong length or
    /// non-finite values.
    fn validate_embedding(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.embedding_dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.embedding_dimensions,
                got: embedding.len(),
            });
        }

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::Malformed(
                "vector contains non-finite values".to_string(),
            ));
        }

        Ok(())
    }
}

impl EmbeddingProvider for OpenAiClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let response = self
            .client()?
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.embedding_model,
                "input": text,
            }))
            .send()?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Status(response.status()));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Malformed("no embedding in response".to_string()))?;

        self.validate_embedding(&embedding)?;

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }
}

impl Captioner for OpenAiClient {
    fn caption(&self, image: &[u8]) -> anyhow::Result<String> {
        let format = infer::get(image)
            .map(|ftype| ftype.extension())
            .unwrap_or("jpeg");
        let data_url = format!("data:image/{format};base64,{}", STANDARD.encode(image));

        let response = self
            .client()?
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.caption_model,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": CAPTION_PROMPT },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ],
                }],
            }))
            .send()?;

        if !response.status().is_success() {
            anyhow::bail!("caption endpoint returned status {}", response.status());
        }

        let parsed: ChatResponse = response.json()?;
        let caption = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("caption response carried no content")?;

        if caption.trim().is_empty() {
            anyhow::bail!("caption response was empty");
        }

        Ok(caption)
    }
}

impl Transcriber for OpenAiClient {
    fn transcribe(&self, audio: &[u8], filename: &str) -> anyhow::Result<String> {
        let part = reqwest::blocking::multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str(audio_mime(filename))?;

        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone());

        let response = self
            .client()?
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;

        if !response.status().is_success() {
            anyhow::bail!(
                "transcription endpoint returned status {}",
                response.status()
            );
        }

        let parsed: TranscriptionResponse = response.json()?;
        Ok(parsed.text)
    }
}

/// MIME type for an uploaded recording, inferred from the filename
/// extension the way the transcription endpoint expects.
fn audio_mime(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "m4a" => "audio/m4a",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        _ => "audio/mp3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(dimensions: usize) -> OpenAiClient {
        OpenAiClient {
            api_key: "test".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: dimensions,
            caption_model: "gpt-4o".to_string(),
            transcription_model: "gpt-4o-transcribe".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_audio_mime_from_extension() {
        assert_eq!(audio_mime("memo.m4a"), "audio/m4a");
        assert_eq!(audio_mime("memo.WAV"), "audio/wav");
        assert_eq!(audio_mime("memo.flac"), "audio/flac");
        assert_eq!(audio_mime("memo.ogg"), "audio/ogg");
        assert_eq!(audio_mime("memo.mp3"), "audio/mp3");
        assert_eq!(audio_mime("no-extension"), "audio/mp3");
    }

    #[test]
    fn test_embed_rejects_empty_input() {
        let client = test_client(4);
        assert!(matches!(
            client.embed("   "),
            Err(EmbeddingError::EmptyInput)
        ));
    }

    #[test]
    fn test_validate_embedding_dimensions() {
        let client = test_client(4);
        assert!(client.validate_embedding(&[0.1, 0.2, 0.3, 0.4]).is_ok());
        assert!(matches!(
            client.validate_embedding(&[0.1, 0.2]),
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                got: 2
            })
        ));
    }

    #[test]
    fn test_validate_embedding_non_finite() {
        let client = test_client(3);
        assert!(matches!(
            client.validate_embedding(&[0.1, f32::NAN, 0.3]),
            Err(EmbeddingError::Malformed(_))
        ));
    }

    #[test]
    fn test_embedding_response_parsing() {
        let json = serde_json::json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3] }],
            "model": "text-embedding-3-small"
        });

        let parsed: EmbeddingResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_chat_response_parsing() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "a red bicycle" } }]
        });

        let parsed: ChatResponse = serde_json::from_value(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("a red bicycle")
        );
    }
}
