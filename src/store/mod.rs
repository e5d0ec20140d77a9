//! Image store abstraction.
//!
//! The store owns two things: the table of image records and the directory
//! of uploaded files those records point to. The render path only reads
//! (random selection and file bytes); intake checks hashes, writes files and
//! inserts records.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐    ┌──────────────────┐
//! │  RenderService   │    │     Intake       │
//! └────────┬─────────┘    └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────────────────────────────┐
//! │           ImageStore Trait              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  LocalImageStore (SQLite + directory)   │
//! └─────────────────────────────────────────┘
//! ```

mod local;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::IoError;

pub use local::LocalImageStore;

/// A stored image record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub id: i64,

    /// Name of the file inside the store's files directory
    pub stored_filename: String,

    /// Filename supplied by the uploader
    pub original_filename: String,

    /// Lowercase hex content hash
    pub content_hash: String,

    /// Upload time (epoch milliseconds)
    pub created_at: i64,
}

/// Fields needed to insert a record; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImageRecord {
    pub stored_filename: String,
    pub original_filename: String,
    pub content_hash: String,
    pub created_at: i64,
}

impl NewImageRecord {
    /// Attach an id, producing the stored record.
    pub fn with_id(self, id: i64) -> ImageRecord {
        ImageRecord {
            id,
            stored_filename: self.stored_filename,
            original_filename: self.original_filename,
            content_hash: self.content_hash,
            created_at: self.created_at,
        }
    }
}

/// Storage backend for image records and their files.
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    /// One record chosen uniformly at random, or `None` if there are none.
    async fn random_record(&self) -> Result<Option<ImageRecord>, IoError>;

    /// The record with the given content hash, if any.
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<ImageRecord>, IoError>;

    /// Insert a record and return it with its assigned id.
    ///
    /// A record whose content hash is already stored is `IoError::Conflict`.
    async fn insert_record(&self, record: NewImageRecord) -> Result<ImageRecord, IoError>;

    /// Read a stored file. Missing files are `IoError::NotFound`.
    async fn read_file(&self, stored_filename: &str) -> Result<Bytes, IoError>;

    /// Write (or overwrite) a stored file.
    async fn write_file(&self, stored_filename: &str, data: Bytes) -> Result<(), IoError>;

    /// Delete a stored file. A file that is already gone is not an error.
    async fn remove_file(&self, stored_filename: &str) -> Result<(), IoError>;
}

/// Reject stored filenames that could escape the files directory.
pub fn validate_stored_filename(name: &str) -> Result<(), IoError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if invalid {
        return Err(IoError::InvalidName(name.to_string()));
    }
    Ok(())
}
