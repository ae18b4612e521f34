//! Content normalization: the first stage of the ingestion pipeline.
//!
//! Turns one of {raw text, image bytes, audio bytes, detected media URL}
//! into canonical display text plus a type tag and type-specific metadata.
//! Captioning/transcription failures abort ingestion with a
//! [`ContentProcessingError`]; a failed provider title lookup does not,
//! a placeholder title is substituted instead.

pub mod providers;

use crate::entries::{Author, EntryKind, EntryMetadata};
use crate::openai::{Captioner, Transcriber};
use self::providers::TitleLookup;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ContentProcessingError {
    #[error("submitted content is empty")]
    EmptyContent,

    #[error("image captioning failed: {0}")]
    Caption(#[source] anyhow::Error),

    #[error("audio transcription failed: {0}")]
    Transcription(#[source] anyhow::Error),
}

/// Output of normalization: what the entry will display and how it is
/// typed. Blob reference URLs are attached later by the caller, once the
/// original bytes have been persisted out-of-band.
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    pub display_text: String,
    pub metadata: EntryMetadata,
}

pub struct Normalizer {
    captioner: Arc<dyn Captioner>,
    transcriber: Arc<dyn Transcriber>,
    titles: Arc<dyn TitleLookup>,
}

impl Normalizer {
    pub fn new(
        captioner: Arc<dyn Captioner>,
        transcriber: Arc<dyn Transcriber>,
        titles: Arc<dyn TitleLookup>,
    ) -> Self {
        Self {
            captioner,
            transcriber,
            titles,
        }
    }

    /// Free text. A recognized provider URL turns the entry into a typed
    /// media node whose display text is the looked-up (or placeholder)
    /// title, never the raw URL.
    pub fn normalize_text(&self, text: &str) -> Result<NormalizedContent, ContentProcessingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContentProcessingError::EmptyContent);
        }

        let detected = match providers::detect_url(text) {
            Some(detected) => detected,
            None => {
                return Ok(NormalizedContent {
                    display_text: text.to_string(),
                    metadata: EntryMetadata {
                        kind: EntryKind::Text,
                        ..Default::default()
                    },
                })
            }
        };

        let title = match self.titles.lookup(&detected) {
            Ok(title) => title,
            Err(err) => {
                log::warn!("title lookup failed for {}: {err}", detected.url);
                providers::placeholder_title(&detected)
            }
        };

        let metadata = EntryMetadata {
            kind: detected.kind,
            original_url: Some(detected.url.clone()),
            embed_url: Some(detected.embed_url.clone()),
            video_id: match detected.kind {
                EntryKind::Youtube => Some(detected.id.clone()),
                _ => None,
            },
            spotify_id: match detected.kind {
                EntryKind::Spotify => Some(detected.id.clone()),
                _ => None,
            },
            spotify_kind: detected.spotify_kind.clone(),
            ..Default::default()
        };

        Ok(NormalizedContent {
            display_text: title,
            metadata,
        })
    }

    /// Image bytes. The vision caption becomes the display text; the bytes
    /// themselves never enter the entry table.
    pub fn normalize_image(
        &self,
        image: &[u8],
    ) -> Result<NormalizedContent, ContentProcessingError> {
        if image.is_empty() {
            return Err(ContentProcessingError::EmptyContent);
        }

        let caption = self
            .captioner
            .caption(image)
            .map_err(ContentProcessingError::Caption)?;

        Ok(NormalizedContent {
            display_text: caption,
            metadata: EntryMetadata {
                kind: EntryKind::Image,
                ..Default::default()
            },
        })
    }

    /// Audio bytes. The transcript becomes the display text.
    pub fn normalize_audio(
        &self,
        audio: &[u8],
        filename: &str,
    ) -> Result<NormalizedContent, ContentProcessingError> {
        if audio.is_empty() {
            return Err(ContentProcessingError::EmptyContent);
        }

        let transcript = self
            .transcriber
            .transcribe(audio, filename)
            .map_err(ContentProcessingError::Transcription)?;

        Ok(NormalizedContent {
            display_text: transcript,
            metadata: EntryMetadata {
                kind: EntryKind::Audio,
                ..Default::default()
            },
        })
    }
}

/// Parse free-form author input. A leading `@` marks an Instagram handle
/// and derives a profile URL; anything else is just a display name.
pub fn parse_author(input: &str) -> Option<Author> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(handle) = trimmed.strip_prefix('@') {
        if handle.is_empty() {
            return None;
        }
        return Some(Author {
            // keep the @ in the display name
            name: Some(trimmed.to_string()),
            instagram: Some(handle.to_string()),
            url: Some(format!("https://instagram.com/{handle}")),
        });
    }

    Some(Author {
        name: Some(trimmed.to_string()),
        ..Default::default()
    })
}
