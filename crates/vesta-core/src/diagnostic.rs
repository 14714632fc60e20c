//! Diagnostics accumulated while rewriting a class.

use std::fmt;

/// How serious a rule violation observed during analysis is.
///
/// Ordered so that `Informational < Warning < Error`; the analysis
/// configuration's minimum severity decides which diagnostics abort a class
/// load.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Informational,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Informational => f.write_str("informational"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A single message produced by an analysis or emission pass.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Member the diagnostic was raised in, as `name:descriptor`, when known.
    pub member: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            member: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn in_member(mut self, name: &str, descriptor: &str) -> Self {
        self.member = Some(format!("{name}:{descriptor}"));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "[{}] {} ({member})", self.severity, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_threshold_semantics() {
        assert!(Severity::Informational < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn display_includes_member_context() {
        let d = Diagnostic::error("Disallowed reference to API; java.lang.Object.wait()")
            .in_member("apply", "()V");
        assert_eq!(
            d.to_string(),
            "[error] Disallowed reference to API; java.lang.Object.wait() (apply:()V)"
        );
    }
}
