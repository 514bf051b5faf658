//! Source access: reading script text and enumerating a workspace

use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use thiserror::Error;
use walkdir::WalkDir;

use crate::paths;

/// Why a script's text could not be obtained
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not valid UTF-8", path.display())]
    Decode { path: PathBuf },
}

/// Gives the registry the freshest text for a path
pub trait SourceProvider {
    fn read_source(&self, path: &Path) -> Result<String, SourceError>;
}

pub fn read_from_disk(path: &Path) -> Result<String, SourceError> {
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| SourceError::Decode {
        path: path.to_path_buf(),
    })
}

/// Unsaved editor buffers layered over the disk
///
/// An open buffer's text wins over the file on disk; closing the buffer makes
/// the disk authoritative again.
#[derive(Debug, Default)]
pub struct OpenBuffers {
    buffers: DashMap<PathBuf, String>,
}

impl OpenBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: PathBuf, text: String) {
        self.buffers.insert(path, text);
    }

    pub fn remove(&self, path: &Path) -> Option<String> {
        self.buffers.remove(path).map(|(_, text)| text)
    }

    /// Text of one line of an open buffer, or of the file on disk
    pub fn line(&self, path: &Path, line: usize) -> Option<String> {
        let text = self.read_source(path).ok()?;
        text.split('\n')
            .nth(line)
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
    }
}

impl SourceProvider for OpenBuffers {
    fn read_source(&self, path: &Path) -> Result<String, SourceError> {
        if let Some(text) = self.buffers.get(path) {
            return Ok(text.value().clone());
        }
        read_from_disk(path)
    }
}

/// Recursively list every enabled script under `root`, sorted by path
///
/// Hidden directories are skipped, as are files whose base name carries the
/// disable marker.
pub fn discover_scripts(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!("skipping unreadable workspace entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| paths::normalize(entry.path()))
        .filter(|path| paths::is_script(path) && !paths::is_disabled(path))
        .collect();
    found.sort();
    found
}

/// In-memory sources keyed by normalized path
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct MemorySource(pub std::collections::HashMap<PathBuf, String>);

#[cfg(test)]
impl MemorySource {
    pub fn with(mut self, path: &str, text: &str) -> Self {
        self.0.insert(PathBuf::from(path), text.to_string());
        self
    }

    pub fn set(&mut self, path: &str, text: &str) {
        self.0.insert(PathBuf::from(path), text.to_string());
    }

    pub fn delete(&mut self, path: &str) {
        self.0.remove(Path::new(path));
    }
}

#[cfg(test)]
impl SourceProvider for MemorySource {
    fn read_source(&self, path: &Path) -> Result<String, SourceError> {
        self.0.get(path).cloned().ok_or_else(|| SourceError::Io {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::NotFound),
        })
    }
}
