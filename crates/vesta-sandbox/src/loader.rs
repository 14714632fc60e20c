//! The sandbox class loader and its load state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use vesta_cache::CacheEntry;
use vesta_core::{binary_name, internal_name, is_sandbox_name};
use vesta_rewrite::rewrite_class;

use crate::config::SandboxConfiguration;
use crate::error::SandboxError;

/// A class defined by a sandbox loader.
///
/// While a class is still being defined, requests for it (from cyclic
/// self-references in constant pools) observe this value with its bytecode
/// not yet published.
#[derive(Debug)]
pub struct LoadedClass {
    sandbox_name: String,
    entry: OnceLock<Arc<CacheEntry>>,
}

impl LoadedClass {
    fn new(sandbox_name: String) -> Arc<Self> {
        Arc::new(Self {
            sandbox_name,
            entry: OnceLock::new(),
        })
    }

    /// Sandbox internal name.
    pub fn name(&self) -> &str {
        &self.sandbox_name
    }

    /// The rewritten bytecode; `None` while the class is still loading.
    pub fn byte_code(&self) -> Option<&Arc<CacheEntry>> {
        self.entry.get()
    }
}

/// Result of a load request: sandbox classes carry rewritten bytecode,
/// whitelisted and pinned names fall through to the host.
#[derive(Debug, Clone)]
pub enum SandboxClass {
    Host(String),
    Sandboxed(Arc<LoadedClass>),
}

enum LoadState {
    Loading(Arc<LoadedClass>),
    Defined(Arc<LoadedClass>),
    Failed(Arc<SandboxError>),
}

/// Loads `sandbox.*` classes by driving the rewriter through the cache.
///
/// User code only ever sees sandbox loaders: `parent()` is the parent sandbox
/// loader, and there is no path upward to the host application loader.
pub struct SandboxClassLoader {
    config: Arc<SandboxConfiguration>,
    parent: Option<Arc<SandboxClassLoader>>,
    states: Mutex<HashMap<String, LoadState>>,
}

impl SandboxClassLoader {
    pub fn new(config: Arc<SandboxConfiguration>) -> Arc<Self> {
        Arc::new(Self {
            config,
            parent: None,
            states: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_parent(config: Arc<SandboxConfiguration>, parent: Arc<SandboxClassLoader>) -> Arc<Self> {
        Arc::new(Self {
            config,
            parent: Some(parent),
            states: Mutex::new(HashMap::new()),
        })
    }

    pub fn parent(&self) -> Option<&Arc<SandboxClassLoader>> {
        self.parent.as_ref()
    }

    pub fn configuration(&self) -> &Arc<SandboxConfiguration> {
        &self.config
    }

    /// Load a class by binary name (`sandbox.foo.Bar`).
    ///
    /// Names outside the sandbox namespace fall through to the host when
    /// pinned or whitelisted, and fail otherwise.
    pub fn load_sandbox_class(&self, name: &str) -> Result<SandboxClass, SandboxError> {
        let internal = internal_name(name);
        if !is_sandbox_name(&internal) {
            let resolver = self.config.rewrite().resolver();
            if resolver.is_pinned(&internal) || resolver.is_whitelisted(&internal) {
                return Ok(SandboxClass::Host(internal));
            }
            return Err(SandboxError::ClassNotFound(name.to_string()));
        }

        // {absent} -> {loading} -> {defined} | {failed}
        let placeholder = {
            let mut states = self.states.lock().expect("loader state poisoned");
            match states.get(&internal) {
                Some(LoadState::Defined(class)) => {
                    return Ok(SandboxClass::Sandboxed(Arc::clone(class)))
                }
                Some(LoadState::Loading(class)) => {
                    // Cycle break: hand back the partially defined class.
                    return Ok(SandboxClass::Sandboxed(Arc::clone(class)));
                }
                Some(LoadState::Failed(err)) => {
                    return Err(SandboxError::PreviousFailure(Arc::clone(err)))
                }
                None => {
                    let placeholder = LoadedClass::new(internal.clone());
                    states.insert(internal.clone(), LoadState::Loading(Arc::clone(&placeholder)));
                    placeholder
                }
            }
        };

        match self.define(&internal, &placeholder) {
            Ok(()) => {
                let mut states = self.states.lock().expect("loader state poisoned");
                states.insert(internal, LoadState::Defined(Arc::clone(&placeholder)));
                Ok(SandboxClass::Sandboxed(placeholder))
            }
            Err(err) => {
                // Unwind the loading marker; the failure is cached terminally.
                let err = Arc::new(err);
                let mut states = self.states.lock().expect("loader state poisoned");
                states.insert(internal, LoadState::Failed(Arc::clone(&err)));
                Err(SandboxError::PreviousFailure(err))
            }
        }
    }

    /// Eagerly load every sandbox name the class references, transitively.
    pub fn resolve_references(&self, class: &LoadedClass) -> Result<(), SandboxError> {
        let mut visited: std::collections::HashSet<String> =
            std::iter::once(class.name().to_string()).collect();
        let mut pending: Vec<String> = match class.byte_code() {
            Some(entry) => entry.references.iter().cloned().collect(),
            None => return Ok(()),
        };
        while let Some(reference) = pending.pop() {
            if !visited.insert(reference.clone()) {
                continue;
            }
            if let SandboxClass::Sandboxed(loaded) =
                self.load_sandbox_class(&binary_name(&reference))?
            {
                if let Some(entry) = loaded.byte_code() {
                    pending.extend(entry.references.iter().cloned());
                }
            }
        }
        Ok(())
    }

    fn define(
        &self,
        internal: &str,
        placeholder: &Arc<LoadedClass>,
    ) -> Result<(), SandboxError> {
        if let Some(cached) = self.config.cache().get(internal) {
            tracing::debug!(target = "vesta.loader", name = internal, "cache hit");
            let _ = placeholder.entry.set(cached);
            return Ok(());
        }

        let host_internal = self.config.rewrite().resolver().reverse(internal);
        let host_bytes = self.config.source().load_class_bytes(&host_internal)?;
        let rewritten = rewrite_class(self.config.rewrite(), &host_bytes)?;
        if rewritten.sandbox_name != internal {
            return Err(SandboxError::NameMismatch {
                requested: binary_name(internal),
                declared: binary_name(&rewritten.sandbox_name),
            });
        }

        tracing::debug!(
            target = "vesta.loader",
            name = internal,
            bytes = rewritten.bytes.len(),
            references = rewritten.references.len(),
            "rewritten and defined"
        );
        let entry = self.config.cache().put_if_absent(CacheEntry {
            name: rewritten.sandbox_name,
            bytes: rewritten.bytes,
            references: rewritten.references,
        });
        let _ = placeholder.entry.set(entry);
        Ok(())
    }
}
