use std::sync::Arc;

use vesta_rewrite::{RewriteError, SandboxClassLoadingError};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A forbidden value or API reached the sandbox boundary.
    #[error("{0}")]
    RuleViolation(String),

    #[error(transparent)]
    Loading(#[from] SandboxClassLoadingError),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error(transparent)]
    Source(#[from] vesta_source::SourceError),

    #[error(transparent)]
    Cache(#[from] vesta_cache::CacheError),

    #[error("classfile error: {0}")]
    ClassFile(#[from] vesta_classfile::Error),

    /// A failed class load. The failure is cached terminally, so repeat
    /// requests observe the same shared error.
    #[error("{0}")]
    PreviousFailure(Arc<SandboxError>),

    #[error(
        "classfile for {requested} declares {declared}; refusing to define it under a different name"
    )]
    NameMismatch { requested: String, declared: String },
}

impl From<RewriteError> for SandboxError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::ClassFile(inner) => SandboxError::ClassFile(inner),
            RewriteError::Loading(inner) => SandboxError::Loading(inner),
        }
    }
}
