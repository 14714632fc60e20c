//! Directory-backed external cache.
//!
//! Each entry is a `.class` file under the root plus a JSON sidecar holding
//! the content digest and the referenced sandbox names. Writes go through a
//! temporary file and a rename so concurrent readers never observe a torn
//! entry; reads verify the digest and degrade to a miss on any mismatch.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::CacheEntry;
use crate::error::CacheError;
use crate::external::{ExternalCache, ExternalEntry};

#[derive(Debug, Serialize, Deserialize)]
struct EntryMetadata {
    sha256: String,
    references: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn class_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.class"))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn try_load(&self, name: &str) -> Result<Option<ExternalEntry>, CacheError> {
        let class_path = self.class_path(name);
        if !class_path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&class_path)?;
        let metadata: EntryMetadata =
            serde_json::from_slice(&std::fs::read(self.metadata_path(name))?)?;
        if digest_hex(&bytes) != metadata.sha256 {
            return Err(CacheError::DigestMismatch {
                name: name.to_string(),
            });
        }
        Ok(Some(ExternalEntry {
            bytes,
            references: metadata.references,
        }))
    }

    fn try_store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let metadata = EntryMetadata {
            sha256: digest_hex(&entry.bytes),
            references: entry.references.clone(),
        };
        atomic_write(&self.class_path(&entry.name), &entry.bytes)?;
        atomic_write(
            &self.metadata_path(&entry.name),
            &serde_json::to_vec_pretty(&metadata)?,
        )?;
        Ok(())
    }
}

impl ExternalCache for DirectoryCache {
    fn load(&self, name: &str) -> Option<ExternalEntry> {
        match self.try_load(name) {
            Ok(found) => found,
            Err(err) => {
                // Corruption degrades to a miss; the entry will be rewritten
                // and stored again.
                tracing::debug!(
                    target = "vesta.cache",
                    name,
                    error = %err,
                    "external cache read failed"
                );
                None
            }
        }
    }

    fn store(&self, entry: &CacheEntry) {
        if let Err(err) = self.try_store(entry) {
            tracing::debug!(
                target = "vesta.cache",
                name = %entry.name,
                error = %err,
                "external cache write failed"
            );
        }
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        use std::fmt::Write as _;
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = path
        .parent()
        .ok_or_else(|| CacheError::NoParentDirectory(path.to_path_buf()))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| CacheError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> CacheEntry {
        CacheEntry {
            name: name.to_string(),
            bytes: vec![0xCA, 0xFE, 0xBA, 0xBE],
            references: ["sandbox/java/lang/Object".to_string()].into(),
        }
    }

    #[test]
    fn round_trips_bytes_and_references() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path());
        cache.store(&entry("sandbox/com/example/Foo"));

        let found = cache.load("sandbox/com/example/Foo").unwrap();
        assert_eq!(found.bytes, vec![0xCA, 0xFE, 0xBA, 0xBE]);
        assert!(found.references.contains("sandbox/java/lang/Object"));
    }

    #[test]
    fn corrupted_entries_degrade_to_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path());
        cache.store(&entry("sandbox/com/example/Foo"));

        std::fs::write(
            dir.path().join("sandbox/com/example/Foo.class"),
            [0x00, 0x01],
        )
        .unwrap();
        assert!(cache.load("sandbox/com/example/Foo").is_none());
    }

    #[test]
    fn missing_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path());
        assert!(cache.load("sandbox/com/example/Missing").is_none());
    }
}
