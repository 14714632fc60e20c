//! One classpath entry: a JAR archive or an exploded class directory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::SourceError;

#[derive(Debug)]
enum Backing {
    /// Archive handles are opened lazily and held until [`ClassSource::close`].
    Jar(Mutex<Option<ZipArchive<File>>>),
    Directory,
}

#[derive(Debug)]
pub struct ClassSource {
    path: PathBuf,
    backing: Backing,
}

impl ClassSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        if path.is_dir() {
            return Ok(Self {
                path,
                backing: Backing::Directory,
            });
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if extension.eq_ignore_ascii_case("jar") || extension.eq_ignore_ascii_case("zip") {
            return Ok(Self {
                path,
                backing: Backing::Jar(Mutex::new(None)),
            });
        }
        Err(SourceError::UnsupportedPath(path.display().to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read an entry by archive-relative name.
    ///
    /// Returns `Ok(None)` when the entry isn't present.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        match &self.backing {
            Backing::Directory => {
                let candidate = self.path.join(name);
                if !candidate.is_file() {
                    return Ok(None);
                }
                let mut buf = Vec::new();
                File::open(&candidate)?.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Backing::Jar(handle) => {
                let mut guard = handle.lock().expect("archive handle poisoned");
                if guard.is_none() {
                    *guard = Some(ZipArchive::new(File::open(&self.path)?)?);
                }
                let zip = guard.as_mut().expect("archive handle just opened");
                let result = match zip.by_name(name) {
                    Ok(mut entry) => {
                        let mut buf = Vec::with_capacity(entry.size() as usize);
                        entry.read_to_end(&mut buf)?;
                        Ok(Some(buf))
                    }
                    Err(zip::result::ZipError::FileNotFound) => Ok(None),
                    Err(err) => Err(err.into()),
                };
                result
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match &self.backing {
            Backing::Directory => self.path.join(name).is_file(),
            Backing::Jar(handle) => {
                let mut guard = handle.lock().expect("archive handle poisoned");
                if guard.is_none() {
                    match File::open(&self.path).map_err(SourceError::from).and_then(
                        |file| ZipArchive::new(file).map_err(SourceError::from),
                    ) {
                        Ok(zip) => *guard = Some(zip),
                        Err(err) => {
                            tracing::debug!(
                                target = "vesta.source",
                                path = %self.path.display(),
                                error = %err,
                                "failed to open archive"
                            );
                            return false;
                        }
                    }
                }
                let zip = guard.as_mut().expect("archive handle just opened");
                let found = zip.by_name(name).is_ok();
                found
            }
        }
    }

    /// Internal names of every class in this entry.
    pub fn class_names(&self) -> Result<Vec<String>, SourceError> {
        match &self.backing {
            Backing::Directory => {
                let mut names = Vec::new();
                for entry in WalkDir::new(&self.path) {
                    let entry = entry.map_err(|e| {
                        SourceError::Io(e.into_io_error().unwrap_or_else(|| {
                            std::io::Error::other("walkdir error without io cause")
                        }))
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let Ok(relative) = entry.path().strip_prefix(&self.path) else {
                        continue;
                    };
                    let relative = relative.to_string_lossy().replace('\\', "/");
                    if let Some(name) = relative.strip_suffix(".class") {
                        names.push(name.to_string());
                    }
                }
                Ok(names)
            }
            Backing::Jar(handle) => {
                let mut guard = handle.lock().expect("archive handle poisoned");
                if guard.is_none() {
                    *guard = Some(ZipArchive::new(File::open(&self.path)?)?);
                }
                let zip = guard.as_mut().expect("archive handle just opened");
                let mut names = Vec::new();
                for i in 0..zip.len() {
                    let entry = zip.by_index(i)?;
                    if let Some(name) = entry.name().strip_suffix(".class") {
                        names.push(name.to_string());
                    }
                }
                Ok(names)
            }
        }
    }

    /// Release any cached archive handle. Reading again reopens it.
    pub fn close(&self) {
        if let Backing::Jar(handle) = &self.backing {
            *handle.lock().expect("archive handle poisoned") = None;
        }
    }
}
