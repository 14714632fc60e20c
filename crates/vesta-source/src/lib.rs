//! Locating raw class bytes for the rewriter.
//!
//! A source loader is a parent-first hierarchy over JAR archives and exploded
//! class directories. It can serve class headers without fully decoding a
//! class, and answers the assignability questions the sandbox loader needs.

#![forbid(unsafe_code)]

mod archive;
mod loader;

pub use crate::archive::ClassSource;
pub use crate::loader::SourceClassLoader;

use vesta_core::binary_name;

/// Resource whose presence marks an archive for eager rewriting.
pub const PRELOAD_MANIFEST: &str = "META-INF/DJVM-preload";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("classfile error: {0}")]
    ClassFile(#[from] vesta_classfile::Error),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("unsupported source path: {0}")]
    UnsupportedPath(String),
}

impl SourceError {
    pub(crate) fn not_found(internal_name: &str) -> Self {
        SourceError::ClassNotFound(binary_name(internal_name))
    }
}
