//! SQLite + local directory implementation of `ImageStore`.
//!
//! Every database operation opens its own connection on a blocking thread
//! and closes it when done; connections are never pooled or shared.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::fs;
use tokio::task;
use tracing::{debug, info};

use crate::error::IoError;

use super::{validate_stored_filename, ImageRecord, ImageStore, NewImageRecord};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS images (
        id                INTEGER PRIMARY KEY,
        filename          TEXT NOT NULL,
        filename_original TEXT NOT NULL,
        hash              TEXT NOT NULL,
        created           INTEGER NOT NULL
    );
    DROP INDEX IF EXISTS idx_images_hash;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_images_hash_unique ON images(hash);
";

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "SELECT id, filename, filename_original, hash, created FROM images";

/// Image records in a SQLite file, image bytes in a directory.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    db_path: PathBuf,
    files_dir: PathBuf,
}

impl LocalImageStore {
    /// Create a store. Nothing is touched on disk until an operation runs.
    pub fn new(db_path: impl Into<PathBuf>, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            files_dir: files_dir.into(),
        }
    }

    /// Create the files directory and the schema if they are missing.
    pub async fn initialize(&self) -> Result<(), IoError> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(storage_error)?;
        }
        fs::create_dir_all(&self.files_dir)
            .await
            .map_err(storage_error)?;

        self.with_connection(|conn| conn.execute_batch(SCHEMA)).await?;

        debug!(db = %self.db_path.display(), files = %self.files_dir.display(), "store initialized");
        Ok(())
    }

    /// Drop all records and delete all stored files.
    ///
    /// Returns the number of files removed.
    pub async fn reset(&self) -> Result<usize, IoError> {
        self.initialize().await?;
        self.with_connection(|conn| {
            conn.execute_batch("DROP TABLE IF EXISTS images;")?;
            conn.execute_batch(SCHEMA)
        })
        .await?;

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.files_dir)
            .await
            .map_err(storage_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(storage_error)? {
            let file_type = entry.file_type().await.map_err(storage_error)?;
            if file_type.is_file() {
                fs::remove_file(entry.path()).await.map_err(storage_error)?;
                removed += 1;
            }
        }

        info!(removed, "store reset");
        Ok(removed)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64, IoError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|n| n.max(0) as u64)
    }

    /// Run `f` against a fresh connection on a blocking thread.
    async fn with_connection<F, T>(&self, f: F) -> Result<T, IoError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&conn)
        })
        .await
        .map_err(|e| IoError::Database(e.to_string()))?
        .map_err(IoError::from)
    }

    fn file_path(&self, stored_filename: &str) -> Result<PathBuf, IoError> {
        validate_stored_filename(stored_filename)?;
        Ok(self.files_dir.join(stored_filename))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn random_record(&self) -> Result<Option<ImageRecord>, IoError> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("{} ORDER BY RANDOM() LIMIT 1", SELECT_COLUMNS),
                [],
                row_to_record,
            )
            .optional()
        })
        .await
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<ImageRecord>, IoError> {
        let content_hash = content_hash.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                &format!("{} WHERE hash = ?1 LIMIT 1", SELECT_COLUMNS),
                params![content_hash],
                row_to_record,
            )
            .optional()
        })
        .await
    }

    async fn insert_record(&self, record: NewImageRecord) -> Result<ImageRecord, IoError> {
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO images (filename, filename_original, hash, created)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.stored_filename,
                    record.original_filename,
                    record.content_hash,
                    record.created_at,
                ],
            )?;
            Ok(record.with_id(conn.last_insert_rowid()))
        })
        .await
    }

    async fn read_file(&self, stored_filename: &str) -> Result<Bytes, IoError> {
        let path = self.file_path(stored_filename)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(IoError::NotFound(stored_filename.to_string()))
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn write_file(&self, stored_filename: &str, data: Bytes) -> Result<(), IoError> {
        let path = self.file_path(stored_filename)?;
        fs::create_dir_all(&self.files_dir)
            .await
            .map_err(storage_error)?;
        fs::write(&path, &data).await.map_err(storage_error)
    }

    async fn remove_file(&self, stored_filename: &str) -> Result<(), IoError> {
        let path = self.file_path(stored_filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        stored_filename: row.get(1)?,
        original_filename: row.get(2)?,
        content_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn storage_error(e: std::io::Error) -> IoError {
    IoError::Storage(e.to_string())
}
