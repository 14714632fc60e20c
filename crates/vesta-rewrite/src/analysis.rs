//! Per-class analysis state: what is being rewritten, and what was observed.

use std::collections::BTreeSet;

use vesta_core::{Diagnostic, Severity};

/// Knobs that decide how strict a rewrite is.
#[derive(Debug, Clone)]
pub struct AnalysisConfiguration {
    /// Diagnostics below this severity are dropped from error reports.
    pub minimum_severity: Severity,
    /// Annotation types (internal names) carried through unchanged.
    pub visible_annotations: BTreeSet<String>,
    /// Highest classfile major version accepted.
    pub max_class_version: u16,
}

impl Default for AnalysisConfiguration {
    fn default() -> Self {
        Self {
            minimum_severity: Severity::Warning,
            visible_annotations: BTreeSet::new(),
            // Java 12. Newer inputs are rejected by the version rule.
            max_class_version: 56,
        }
    }
}

/// Immutable record of the class under rewrite, visible to providers and
/// emitters.
#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub host_name: String,
    pub sandbox_name: String,
    pub access_flags: u16,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
}

/// Mutable walk state: aggregates diagnostics across every pass over one
/// class. Violations accumulate rather than aborting eagerly, so a single
/// rewrite reports everything it found.
#[derive(Debug)]
pub struct AnalysisContext<'a> {
    pub config: &'a AnalysisConfiguration,
    pub class: ClassSummary,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(config: &'a AnalysisConfiguration, class: ClassSummary) -> Self {
        Self {
            config,
            class,
            diagnostics: Vec::new(),
        }
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(
            target = "vesta.rewrite",
            class = %self.class.host_name,
            severity = %diagnostic.severity,
            message = %diagnostic.message,
            "analysis diagnostic"
        );
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics at or above the configured minimum severity.
    pub fn reportable(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity >= self.config.minimum_severity)
            .cloned()
            .collect()
    }
}
