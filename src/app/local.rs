use crate::{
    config::Config,
    eid::Eid,
    entries::{self, CollectionSummary, Entry, EntryCreate, EntryStore},
    ingest::{self, providers::OembedTitles, Normalizer},
    openai::{EmbeddingProvider, OpenAiClient},
    projection::{ProjectedPoint, ProjectionCache, ProjectionItem, Projector},
    storage::{self, StorageManager},
};

use super::{backend::*, errors::AppError};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Local application backend: owns the ingestion pipeline
/// (normalize → embed → store), the blob store, and the per-collection
/// layout caches.
pub struct AppLocal {
    pub entry_store: Arc<dyn EntryStore>,
    pub blob_store: Arc<dyn StorageManager>,

    normalizer: Normalizer,
    embedder: Arc<dyn EmbeddingProvider>,
    projector: Projector,

    layout_caches: RwLock<HashMap<String, Arc<ProjectionCache>>>,
}

impl AppLocal {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let entry_store = Arc::new(entries::BackendJson::load(&config.entries_path())?);
        let blob_store = Arc::new(storage::BackendLocal::new(&config.media_dir())?);

        let client = Arc::new(OpenAiClient::from_config(&config.openai));
        let normalizer = Normalizer::new(client.clone(), client.clone(), Arc::new(OembedTitles));

        Ok(Self {
            entry_store,
            blob_store,
            normalizer,
            embedder: client,
            projector: Projector::new(config.openai.embedding_dimensions),
            layout_caches: RwLock::new(HashMap::new()),
        })
    }

    /// A parent must exist and must itself be a root entry; one-level
    /// threading is enforced here, at write time.
    fn validate_parent(&self, parent_id: &Eid) -> Result<(), AppError> {
        let parent = self
            .entry_store
            .get(parent_id)?
            .ok_or(AppError::NotFound)?;

        if parent.is_comment() {
            return Err(AppError::NestedComment(parent.id.to_string()));
        }

        Ok(())
    }

    /// Persist the entry row, then append it to the parent's comment list.
    /// The two writes are deliberately independent: if the second one finds
    /// the parent gone, the orphan is tolerated (readers treat `parent_id`
    /// as authoritative) rather than rolled back.
    fn persist(&self, create: EntryCreate) -> Result<Entry, AppError> {
        let parent_id = create.parent_id.clone();
        let entry = self.entry_store.create(create)?;

        log::info!(
            "created {} entry {} in collection {:?}",
            entry.metadata.kind,
            entry.id,
            entry.collection
        );

        if let Some(parent_id) = parent_id {
            match self.entry_store.attach_comment(&parent_id, &entry.id)? {
                Some(_) => {}
                None => log::warn!(
                    "parent {parent_id} vanished while attaching comment {}; leaving the advisory list stale",
                    entry.id
                ),
            }
        }

        Ok(entry)
    }

    /// Store uploaded media bytes under a fresh ULID ident, inferring the
    /// extension from the bytes and falling back to the original filename.
    fn store_media_blob(&self, data: &[u8], original_name: &str) -> Result<String, AppError> {
        let ext = infer::get(data)
            .map(|ftype| ftype.extension())
            .or_else(|| original_name.rsplit_once('.').map(|(_, ext)| ext))
            .unwrap_or("bin");

        let ident = format!("{}.{}", Eid::new(), ext.to_lowercase());
        self.blob_store.write(&ident, data)?;

        Ok(ident)
    }

    /// Best-effort cleanup of blobs referenced by a deleted entry.
    /// External URLs are left alone.
    fn delete_media_blobs(&self, entry: &Entry) {
        let urls = [&entry.metadata.image_url, &entry.metadata.audio_url];

        for url in urls.into_iter().flatten() {
            if let Some(ident) = storage::media_ident(url) {
                if let Err(err) = self.blob_store.delete(ident) {
                    log::warn!("failed to delete media blob {ident}: {err}");
                }
            }
        }
    }

    fn layout_cache(&self, collection: &str) -> Arc<ProjectionCache> {
        if let Some(cache) = self.layout_caches.read().unwrap().get(collection) {
            return cache.clone();
        }

        self.layout_caches
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(ProjectionCache::new()))
            .clone()
    }

    /// Rebuild every advisory `comment_ids` list from the authoritative
    /// parent links. Exposed through the CLI for operators.
    pub fn reconcile(&self) -> Result<usize, AppError> {
        Ok(self.entry_store.reconcile_comment_ids()?)
    }
}

impl AppBackend for AppLocal {
    fn add_text(&self, request: TextEntryRequest) -> Result<Entry, AppError> {
        if let Some(parent_id) = &request.parent_id {
            self.validate_parent(parent_id)?;
        }

        let mut normalized = self.normalizer.normalize_text(&request.text)?;
        normalized.metadata.author = request.author.as_deref().and_then(ingest::parse_author);

        let embedding = self.embedder.embed(&normalized.display_text)?;

        self.persist(EntryCreate {
            data: normalized.display_text,
            metadata: normalized.metadata,
            embedding,
            collection: request.collection,
            parent_id: request.parent_id,
        })
    }

    fn add_image(&self, request: MediaEntryRequest) -> Result<Entry, AppError> {
        if let Some(parent_id) = &request.parent_id {
            self.validate_parent(parent_id)?;
        }

        let mut normalized = self.normalizer.normalize_image(&request.bytes)?;
        normalized.metadata.author = request.author.as_deref().and_then(ingest::parse_author);

        let embedding = self.embedder.embed(&normalized.display_text)?;

        // bytes go out-of-band; the entry only carries the reference URL
        let ident = self.store_media_blob(&request.bytes, &request.filename)?;
        normalized.metadata.image_url = Some(storage::media_url(&ident));

        self.persist(EntryCreate {
            data: normalized.display_text,
            metadata: normalized.metadata,
            embedding,
            collection: request.collection,
            parent_id: request.parent_id,
        })
    }

    fn add_audio(&self, request: MediaEntryRequest) -> Result<Entry, AppError> {
        if let Some(parent_id) = &request.parent_id {
            self.validate_parent(parent_id)?;
        }

        let mut normalized = self
            .normalizer
            .normalize_audio(&request.bytes, &request.filename)?;
        normalized.metadata.author = request.author.as_deref().and_then(ingest::parse_author);

        let embedding = self.embedder.embed(&normalized.display_text)?;

        let ident = self.store_media_blob(&request.bytes, &request.filename)?;
        normalized.metadata.audio_url = Some(storage::media_url(&ident));

        self.persist(EntryCreate {
            data: normalized.display_text,
            metadata: normalized.metadata,
            embedding,
            collection: request.collection,
            parent_id: request.parent_id,
        })
    }

    fn delete_entry(&self, id: &Eid) -> Result<usize, AppError> {
        let removed = self.entry_store.delete(id)?;

        if removed.is_empty() {
            return Err(AppError::NotFound);
        }

        for entry in &removed {
            self.delete_media_blobs(entry);
        }

        Ok(removed.len())
    }

    fn delete_comment(&self, id: &Eid) -> Result<(), AppError> {
        let entry = self.entry_store.get(id)?.ok_or(AppError::NotFound)?;

        if !entry.is_comment() {
            return Err(AppError::NotAComment(id.to_string()));
        }

        // cascade is a no-op here: comments cannot have children
        let removed = self.entry_store.delete(id)?;
        for entry in &removed {
            self.delete_media_blobs(entry);
        }

        Ok(())
    }

    fn collection_view(&self, name: &str) -> Result<Vec<Entry>, AppError> {
        Ok(self.entry_store.list_by_collection(name)?)
    }

    fn collections(&self) -> Result<Vec<CollectionSummary>, AppError> {
        Ok(self.entry_store.collections()?)
    }

    fn create_collection(&self, name: &str) -> Result<(), AppError> {
        let taken = self
            .entry_store
            .collections()?
            .iter()
            .any(|summary| summary.name == name);

        if taken {
            return Err(AppError::AlreadyExists(name.to_string()));
        }

        // collections have no independent existence; the first entry will
        // create this one for real
        Ok(())
    }

    fn project_collection(&self, name: &str) -> Result<Vec<ProjectedPoint>, AppError> {
        let roots = self.entry_store.list_by_collection(name)?;

        // comments are projected as ordinary points; the renderer draws the
        // edge back to the parent
        let mut items = Vec::new();
        for root in &roots {
            items.push(ProjectionItem {
                id: root.id.clone(),
                embedding: root.embedding.clone(),
            });
            for comment in &root.comments {
                items.push(ProjectionItem {
                    id: comment.id.clone(),
                    embedding: comment.embedding.clone(),
                });
            }
        }

        let cache = self.layout_cache(name);
        Ok(cache.get_or_compute(&items, |items| self.projector.project(items)))
    }
}

#[cfg(test)]
impl AppLocal {
    pub fn new_with(
        entry_store: Arc<dyn EntryStore>,
        blob_store: Arc<dyn StorageManager>,
        normalizer: Normalizer,
        embedder: Arc<dyn EmbeddingProvider>,
        dimensions: usize,
    ) -> Self {
        Self {
            entry_store,
            blob_store,
            normalizer,
            embedder,
            projector: Projector::new(dimensions),
            layout_caches: RwLock::new(HashMap::new()),
        }
    }
}
