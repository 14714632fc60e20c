//! Hierarchical sandbox configurations.
//!
//! A root configuration is built once per sandbox; children add a local user
//! source and a fresh cache chained under the parent's, and inherit the whole
//! rewrite pipeline. Roots never mutate after construction.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use vesta_cache::{ByteCodeCache, ExternalCache};
use vesta_core::Severity;
use vesta_rewrite::{
    AnalysisConfiguration, ClassResolver, ExecutionProfile, RewriteConfiguration, RewriteRules,
    Whitelist,
};
use vesta_source::SourceClassLoader;

use crate::error::SandboxError;

pub struct SandboxConfiguration {
    rewrite: Arc<RewriteConfiguration>,
    source: Arc<SourceClassLoader>,
    cache: Arc<ByteCodeCache>,
    parent: Option<Arc<SandboxConfiguration>>,
}

impl SandboxConfiguration {
    pub fn builder() -> SandboxConfigurationBuilder {
        SandboxConfigurationBuilder::default()
    }

    pub fn rewrite(&self) -> &RewriteConfiguration {
        &self.rewrite
    }

    pub fn source(&self) -> &Arc<SourceClassLoader> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<ByteCodeCache> {
        &self.cache
    }

    pub fn parent(&self) -> Option<&Arc<SandboxConfiguration>> {
        self.parent.as_ref()
    }

    /// A child configuration for one tenant: same pipeline, its own user
    /// source in front of this configuration's sources, and a fresh cache
    /// chained under this configuration's cache.
    pub fn create_child(
        self: &Arc<Self>,
        user_source: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Arc<SandboxConfiguration>, SandboxError> {
        let source = Arc::new(SourceClassLoader::with_parent(
            Some(Arc::clone(&self.source)),
            user_source,
        )?);
        Ok(Arc::new(SandboxConfiguration {
            rewrite: Arc::clone(&self.rewrite),
            source,
            cache: self.cache.child(),
            parent: Some(Arc::clone(self)),
        }))
    }

    /// Release archive handles held by this configuration's sources.
    pub fn close(&self) {
        self.source.close();
    }
}

/// Named configuration inputs; everything has a workable default except the
/// user source.
pub struct SandboxConfigurationBuilder {
    user_source: Vec<PathBuf>,
    bootstrap_source: Option<PathBuf>,
    whitelist: Whitelist,
    pinned_classes: BTreeSet<String>,
    execution_profile: Option<ExecutionProfile>,
    external_cache: Option<Arc<dyn ExternalCache>>,
    minimum_severity: Severity,
    visible_annotations: BTreeSet<String>,
    rules: RewriteRules,
}

impl Default for SandboxConfigurationBuilder {
    fn default() -> Self {
        Self {
            user_source: Vec::new(),
            bootstrap_source: None,
            whitelist: Whitelist::minimal(),
            pinned_classes: BTreeSet::new(),
            execution_profile: None,
            external_cache: None,
            minimum_severity: Severity::Warning,
            visible_annotations: BTreeSet::new(),
            rules: RewriteRules::standard(),
        }
    }
}

impl SandboxConfigurationBuilder {
    pub fn user_source(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.user_source.extend(paths);
        self
    }

    /// The archive holding the deterministic runtime; it backs every lookup
    /// the user source cannot satisfy.
    pub fn bootstrap_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap_source = Some(path.into());
        self
    }

    pub fn whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn pinned_classes(mut self, pins: impl IntoIterator<Item = String>) -> Self {
        self.pinned_classes.extend(pins);
        self
    }

    pub fn execution_profile(mut self, profile: ExecutionProfile) -> Self {
        self.execution_profile = Some(profile);
        self
    }

    pub fn external_cache(mut self, cache: Arc<dyn ExternalCache>) -> Self {
        self.external_cache = Some(cache);
        self
    }

    pub fn minimum_severity(mut self, severity: Severity) -> Self {
        self.minimum_severity = severity;
        self
    }

    pub fn visible_annotations(
        mut self,
        annotations: impl IntoIterator<Item = String>,
    ) -> Self {
        self.visible_annotations.extend(annotations);
        self
    }

    pub fn rules(mut self, rules: RewriteRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn build(self) -> Result<Arc<SandboxConfiguration>, SandboxError> {
        let resolver = ClassResolver::new(self.whitelist).with_pins(self.pinned_classes);
        let analysis = AnalysisConfiguration {
            minimum_severity: self.minimum_severity,
            visible_annotations: self.visible_annotations,
            ..AnalysisConfiguration::default()
        };
        let rewrite = Arc::new(RewriteConfiguration::new(
            resolver,
            self.rules,
            analysis,
            self.execution_profile,
        ));

        let bootstrap = match self.bootstrap_source {
            Some(path) => Some(Arc::new(SourceClassLoader::new([path])?)),
            None => None,
        };
        let source = Arc::new(SourceClassLoader::with_parent(bootstrap, self.user_source)?);

        Ok(Arc::new(SandboxConfiguration {
            rewrite,
            source,
            cache: ByteCodeCache::root(self.external_cache),
            parent: None,
        }))
    }
}
