//! Upload intake: validation, hashing and storage of new images.
//!
//! An upload passes three gates before anything is written: the part's
//! declared Content-Type must be an `image/*` type, the bytes must sniff as
//! one of [`ACCEPTED_FORMATS`], and no record may already carry the same
//! content hash.
//!
//! The hash lookup is only a fast path. Two identical uploads racing past it
//! are settled by the store's unique hash constraint: the losing insert is a
//! conflict, its file is removed and the upload is reported as a duplicate.

use bytes::Bytes;
use image::ImageFormat;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IoError, UploadError};
use crate::store::{ImageRecord, ImageStore, NewImageRecord};

/// Formats accepted for upload.
pub const ACCEPTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// A file part pulled out of a multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename the client sent (empty if none)
    pub original_filename: String,

    /// The part's Content-Type header, if present
    pub content_type: Option<String>,

    pub data: Bytes,
}

/// Check a declared Content-Type.
///
/// A missing or unparseable value is `MalformedContentType`; a well-formed
/// type whose top level is not `image` is `UnsupportedFormat`.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), UploadError> {
    let raw = content_type.ok_or(UploadError::MalformedContentType)?;
    let essence = raw.split(';').next().unwrap_or_default().trim();

    let (top, sub) = essence
        .split_once('/')
        .ok_or(UploadError::MalformedContentType)?;
    if top.is_empty() || sub.is_empty() {
        return Err(UploadError::MalformedContentType);
    }

    if top.eq_ignore_ascii_case("image") {
        Ok(())
    } else {
        Err(UploadError::UnsupportedFormat)
    }
}

/// Detect the format from the leading bytes.
pub fn sniff_format(data: &[u8]) -> Result<ImageFormat, UploadError> {
    let format = image::guess_format(data).map_err(|_| UploadError::UnsupportedFormat)?;
    if ACCEPTED_FORMATS.contains(&format) {
        Ok(format)
    } else {
        Err(UploadError::UnsupportedFormat)
    }
}

/// Lowercase hex SHA-256 of the data.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A fresh random stored filename with the format's canonical extension.
pub fn stored_filename(format: ImageFormat) -> String {
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    format!("{}.{}", Uuid::new_v4().simple(), extension)
}

/// Validate an upload, write its file and record it.
///
/// # Errors
///
/// - `MalformedContentType` / `UnsupportedFormat` from validation
/// - `Duplicate` if an image with the same hash is already stored, or was
///   stored by a concurrent upload
/// - `Io` if the store fails (the written file is removed again)
pub async fn ingest<S: ImageStore + ?Sized>(
    store: &S,
    upload: Upload,
    now_ms: i64,
) -> Result<ImageRecord, UploadError> {
    check_content_type(upload.content_type.as_deref())?;
    let format = sniff_format(&upload.data)?;

    let hash = content_hash(&upload.data);
    if let Some(existing) = store.find_by_hash(&hash).await? {
        debug!(hash = %hash, existing_id = existing.id, "duplicate upload rejected");
        return Err(UploadError::Duplicate { hash });
    }

    let filename = stored_filename(format);
    let size = upload.data.len();
    store.write_file(&filename, upload.data).await?;

    let inserted = store
        .insert_record(NewImageRecord {
            stored_filename: filename.clone(),
            original_filename: upload.original_filename,
            content_hash: hash.clone(),
            created_at: now_ms,
        })
        .await;

    let record = match inserted {
        Ok(record) => record,
        Err(err) => {
            // No record points at the file, so nothing will ever read it
            if let Err(cleanup) = store.remove_file(&filename).await {
                warn!(stored_filename = %filename, error = %cleanup, "failed to remove orphaned upload");
            }
            return Err(match err {
                IoError::Conflict(_) => {
                    debug!(hash = %hash, "concurrent duplicate upload rejected");
                    UploadError::Duplicate { hash }
                }
                other => UploadError::Io(other),
            });
        }
    };

    info!(
        id = record.id,
        stored_filename = %record.stored_filename,
        original_filename = %record.original_filename,
        format = ?format,
        size,
        "stored upload"
    );

    Ok(record)
}
