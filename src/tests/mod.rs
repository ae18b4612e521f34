mod projection;

use crate::app::AppLocal;
use crate::entries::BackendJson;
use crate::ingest::providers::{DetectedUrl, TitleLookup};
use crate::ingest::Normalizer;
use crate::openai::{Captioner, EmbeddingError, EmbeddingProvider, Transcriber};
use crate::storage::BackendLocal;
use std::sync::Arc;

/// Matches the production embedding dimensionality so the round-trip
/// properties hold exactly as specified.
pub const TEST_DIMENSIONS: usize = 1536;

/// Deterministic stand-in for the remote embedding model: a pseudo-random
/// vector seeded by the text, so different texts land in different places.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut state: u64 = {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            text.hash(&mut hasher);
            hasher.finish() | 1
        };

        Ok((0..self.dimensions)
            .map(|_| {
                // xorshift keeps the mock dependency-free
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state as f32 / u64::MAX as f32) - 0.5
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

pub struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Malformed("mock embedding failure".to_string()))
    }

    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }
}

pub struct MockCaptioner;

impl Captioner for MockCaptioner {
    fn caption(&self, _image: &[u8]) -> anyhow::Result<String> {
        Ok("a mock caption describing the image".to_string())
    }
}

pub struct FailingCaptioner;

impl Captioner for FailingCaptioner {
    fn caption(&self, _image: &[u8]) -> anyhow::Result<String> {
        anyhow::bail!("vision service unavailable")
    }
}

pub struct MockTranscriber;

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[u8], _filename: &str) -> anyhow::Result<String> {
        Ok("a mock transcript of the recording".to_string())
    }
}

pub struct FailingTranscriber;

impl Transcriber for FailingTranscriber {
    fn transcribe(&self, _audio: &[u8], _filename: &str) -> anyhow::Result<String> {
        anyhow::bail!("transcription service unavailable")
    }
}

/// Canned title lookup keyed by provider id.
pub struct MockTitles;

impl TitleLookup for MockTitles {
    fn lookup(&self, detected: &DetectedUrl) -> anyhow::Result<String> {
        Ok(format!("Title for {}", detected.id))
    }
}

pub struct FailingTitles;

impl TitleLookup for FailingTitles {
    fn lookup(&self, _detected: &DetectedUrl) -> anyhow::Result<String> {
        anyhow::bail!("provider unreachable")
    }
}

pub struct AppParts {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub captioner: Arc<dyn Captioner>,
    pub transcriber: Arc<dyn Transcriber>,
    pub titles: Arc<dyn TitleLookup>,
}

impl Default for AppParts {
    fn default() -> Self {
        Self {
            embedder: Arc::new(MockEmbedder {
                dimensions: TEST_DIMENSIONS,
            }),
            captioner: Arc::new(MockCaptioner),
            transcriber: Arc::new(MockTranscriber),
            titles: Arc::new(MockTitles),
        }
    }
}

/// Creates an isolated AppLocal over a unique temp directory, wired to
/// mocks instead of the network. Each test gets its own directory so
/// parallel tests never collide.
pub fn create_app_with(parts: AppParts) -> (AppLocal, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    let entries_path = tmp.path().join("entries.json");
    let entry_store =
        Arc::new(BackendJson::load(entries_path.to_str().unwrap()).expect("failed to load store"));

    let blob_store = Arc::new(
        BackendLocal::new(tmp.path().join("media").to_str().unwrap())
            .expect("failed to create blob store"),
    );

    let normalizer = Normalizer::new(parts.captioner, parts.transcriber, parts.titles);

    let app = AppLocal::new_with(
        entry_store,
        blob_store,
        normalizer,
        parts.embedder,
        TEST_DIMENSIONS,
    );

    (app, tmp)
}

pub fn create_app() -> (AppLocal, tempfile::TempDir) {
    create_app_with(AppParts::default())
}

/// Minimal valid PNG header; enough for media-type sniffing.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0; 16]);
    bytes
}
