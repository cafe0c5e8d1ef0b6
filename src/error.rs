use thiserror::Error;

/// Main error type for comicdesk
#[derive(Error, Debug)]
pub enum ComicdeskError {
    /// Local SQLite document store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of stored records
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object store (list / upload / URL resolution) errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document database errors
    #[error("Document store error: {0}")]
    Documents(String),

    /// Input rejected before any backend call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested title, unit or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Metadata step reached without the state produced by the upload step
    #[error("{0}")]
    HandoffMissing(String),

    /// At least one upload in a batch failed and the batch was not finalized
    #[error("Upload batch failed: {failed} of {total} uploads failed (first error: {first_error})")]
    UploadBatch {
        failed: usize,
        total: usize,
        first_error: String,
    },
}

/// Convenient Result type using ComicdeskError
pub type Result<T> = std::result::Result<T, ComicdeskError>;
