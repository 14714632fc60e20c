use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("digest mismatch for cached entry {name}")]
    DigestMismatch { name: String },

    #[error("cache path {0} has no parent directory")]
    NoParentDirectory(PathBuf),
}
