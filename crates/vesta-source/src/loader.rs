use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use vesta_classfile::{parse_header, ClassHeader};

use crate::{ClassSource, SourceError, PRELOAD_MANIFEST};

/// Parent-first source of raw class bytes.
#[derive(Debug)]
pub struct SourceClassLoader {
    parent: Option<Arc<SourceClassLoader>>,
    sources: Vec<ClassSource>,
}

impl SourceClassLoader {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Result<Self, SourceError> {
        Self::with_parent(None, paths)
    }

    pub fn with_parent(
        parent: Option<Arc<SourceClassLoader>>,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Self, SourceError> {
        let sources = paths
            .into_iter()
            .map(ClassSource::open)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parent, sources })
    }

    pub fn parent(&self) -> Option<&Arc<SourceClassLoader>> {
        self.parent.as_ref()
    }

    pub fn sources(&self) -> &[ClassSource] {
        &self.sources
    }

    /// Raw bytes of `internal_name`. The parent wins when it can satisfy the
    /// request; local entries are searched in insertion order.
    pub fn load_class_bytes(&self, internal_name: &str) -> Result<Vec<u8>, SourceError> {
        if let Some(parent) = &self.parent {
            match parent.load_class_bytes(internal_name) {
                Err(SourceError::ClassNotFound(_)) => {}
                other => return other,
            }
        }
        let entry_name = format!("{internal_name}.class");
        for source in &self.sources {
            if let Some(bytes) = source.read(&entry_name)? {
                return Ok(bytes);
            }
        }
        Err(SourceError::not_found(internal_name))
    }

    /// Class shape without decoding member bodies.
    pub fn load_class_header(&self, internal_name: &str) -> Result<ClassHeader, SourceError> {
        let bytes = self.load_class_bytes(internal_name)?;
        Ok(parse_header(&bytes)?)
    }

    /// Whether `internal_name` descends from `java/lang/Throwable`.
    pub fn is_throwable(&self, internal_name: &str) -> Result<bool, SourceError> {
        self.is_assignable_from("java/lang/Throwable", internal_name)
    }

    /// Whether `supertype` is `subtype` or one of its ancestors, walking
    /// superclasses and interfaces through class headers.
    pub fn is_assignable_from(
        &self,
        supertype: &str,
        subtype: &str,
    ) -> Result<bool, SourceError> {
        if supertype == subtype {
            return Ok(true);
        }
        let mut pending = vec![subtype.to_string()];
        let mut visited = HashSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if name == supertype {
                return Ok(true);
            }
            // `java/lang/Object` terminates every chain; classes outside the
            // configured sources end the walk rather than failing it.
            if name == "java/lang/Object" {
                continue;
            }
            let header = match self.load_class_header(&name) {
                Ok(header) => header,
                Err(SourceError::ClassNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if let Some(super_class) = header.super_class {
                pending.push(super_class);
            }
            pending.extend(header.interfaces);
        }
        Ok(false)
    }

    /// Local entries marked for eager rewriting.
    pub fn preload_sources(&self) -> Vec<&ClassSource> {
        self.sources
            .iter()
            .filter(|source| source.contains(PRELOAD_MANIFEST))
            .collect()
    }

    /// Release archive handles, here and in parents.
    pub fn close(&self) {
        for source in &self.sources {
            source.close();
        }
        if let Some(parent) = &self.parent {
            parent.close();
        }
    }
}
