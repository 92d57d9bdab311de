use wayback_common::LogKey;

/// Errors from append-only log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("log key mismatch: directory holds {found}, expected {expected}")]
    KeyMismatch { expected: LogKey, found: LogKey },
    #[error("index {index} out of range for log of length {len}")]
    IndexOutOfRange { index: u64, len: u64 },
    #[error("cannot truncate log of length {len} to {requested}")]
    TruncateBeyondEnd { requested: u64, len: u64 },
    #[error("log is closed")]
    Closed,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
