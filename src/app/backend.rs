use super::errors::AppError;
use crate::eid::Eid;
use crate::entries::{CollectionSummary, Entry};
use crate::projection::ProjectedPoint;

/// A text submission: plain prose or a recognized provider URL.
#[derive(Debug, Clone, Default)]
pub struct TextEntryRequest {
    pub text: String,
    pub collection: String,
    pub parent_id: Option<Eid>,
    pub author: Option<String>,
}

/// An uploaded media blob (image or audio) to be normalized and embedded.
#[derive(Clone, Default)]
pub struct MediaEntryRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub collection: String,
    pub parent_id: Option<Eid>,
    pub author: Option<String>,
}

impl std::fmt::Debug for MediaEntryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MediaEntryRequest {{ bytes: [{} bytes], filename: {:?}, collection: {:?}, parent_id: {:?}, author: {:?} }}",
            self.bytes.len(),
            self.filename,
            self.collection,
            self.parent_id,
            self.author
        )
    }
}

pub trait AppBackend: Send + Sync {
    /// Ingest a text entry (normalize → embed → store). Returns the
    /// created entry; when `parent_id` is set it becomes a comment.
    fn add_text(&self, request: TextEntryRequest) -> Result<Entry, AppError>;

    fn add_image(&self, request: MediaEntryRequest) -> Result<Entry, AppError>;

    fn add_audio(&self, request: MediaEntryRequest) -> Result<Entry, AppError>;

    /// Delete an entry, its comments (cascade) and any media blobs we
    /// stored for them. Returns the number of entries removed.
    fn delete_entry(&self, id: &Eid) -> Result<usize, AppError>;

    /// Delete a single comment and detach it from its parent.
    fn delete_comment(&self, id: &Eid) -> Result<(), AppError>;

    /// Root entries of a collection with comments nested one level deep.
    fn collection_view(&self, name: &str) -> Result<Vec<Entry>, AppError>;

    fn collections(&self) -> Result<Vec<CollectionSummary>, AppError>;

    /// Validate a would-be collection name. Collections spring into being
    /// with their first entry, so this only rejects names already in use.
    fn create_collection(&self, name: &str) -> Result<(), AppError>;

    /// Flatten a collection (roots + comments) and project it to 2D,
    /// reusing the cached layout while the snapshot is unchanged.
    fn project_collection(&self, name: &str) -> Result<Vec<ProjectedPoint>, AppError>;
}
