use thiserror::Error;

/// Errors raised by the image store (record database and file directory).
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Stored file does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// SQLite failure (open, schema, query)
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem failure other than a missing file
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored filename that would escape the files directory
    #[error("Invalid stored filename: {0}")]
    InvalidName(String),

    /// Insert collided with a unique column (content hash)
    #[error("Record already exists: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for IoError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => IoError::Conflict(err.to_string()),
            _ => IoError::Database(err.to_string()),
        }
    }
}

/// Errors on the render path (`GET /images/{w}x{h}`).
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Malformed or out-of-range request parameter (should map to HTTP 400)
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// No image records exist to render from (should map to HTTP 404)
    #[error("No images stored")]
    EmptyStore,

    /// Source image reports a zero dimension
    #[error("Degenerate source image: {width}x{height}")]
    DegenerateSource { width: u32, height: u32 },

    /// Resolved output has zero area and cannot be encoded
    #[error("Resolved output {width}x{height} has no pixels")]
    EmptyOutput { width: u32, height: u32 },

    /// Stored bytes could not be decoded as an image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Scaled image could not be encoded
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Store failure while selecting a record or reading its file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Worker pool closed or a render task panicked
    #[error("Render worker failed: {message}")]
    Worker { message: String },
}

impl RenderError {
    /// Shorthand for an `InvalidParameter` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        RenderError::InvalidParameter {
            message: message.into(),
        }
    }
}

/// Errors on the upload path (`POST /images`).
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// File part has no usable Content-Type header
    #[error("Malformed header. Content-Type")]
    MalformedContentType,

    /// Declared or sniffed format is not one of the accepted formats
    #[error("Unknown File Format, accepts: jpeg, png, gif, bmp, webp")]
    UnsupportedFormat,

    /// Multipart body carried no file part
    #[error("No file part in request")]
    MissingFile,

    /// Multipart body could not be read
    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    /// Request body exceeded the configured upload limit
    #[error("Upload exceeds the size limit")]
    TooLarge,

    /// An image with the same content hash already exists
    #[error("Entry already exists.")]
    Duplicate { hash: String },

    /// Store failure while checking, writing or recording the upload
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}
