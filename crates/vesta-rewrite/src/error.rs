use std::fmt;

use vesta_core::Diagnostic;

/// Raised at rewrite time when a class violates the rule catalog badly
/// enough to be rejected; aggregates every diagnostic at or above the
/// configured minimum severity.
#[derive(Debug, Clone)]
pub struct SandboxClassLoadingError {
    pub class: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for SandboxClassLoadingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Class {} could not be loaded into the sandbox:",
            self.class
        )?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SandboxClassLoadingError {}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("classfile error: {0}")]
    ClassFile(#[from] vesta_classfile::Error),

    #[error(transparent)]
    Loading(#[from] SandboxClassLoadingError),
}
