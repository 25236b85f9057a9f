use std::fs;
use std::io;
use std::path::PathBuf;

use holibot_common::models::Revision;

/// A readable/writable byte store holding the config document.
pub trait ConfigSource: Send + Sync {
    /// Current revision marker, or `Ok(None)` if the source does not exist.
    fn revision(&self) -> io::Result<Option<Revision>>;
    fn read(&self) -> io::Result<Vec<u8>>;
    fn write(&self, bytes: &[u8]) -> io::Result<()>;
    fn describe(&self) -> String;
}

/// Config file on local disk; the revision is its mtime and length.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn revision(&self) -> io::Result<Option<Revision>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(Revision {
                modified: meta.modified()?,
                len: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, bytes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
