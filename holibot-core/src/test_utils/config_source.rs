use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use holibot_common::models::Revision;

use crate::config::source::ConfigSource;

#[derive(Default)]
struct MemoryState {
    contents: Option<Vec<u8>>,
    version: u64,
    fail_writes: bool,
}

/// In-memory [`ConfigSource`]. Clones share state, so a test can keep one
/// handle and edit the "file" after handing another to a `ConfigStore`.
#[derive(Clone, Default)]
pub struct MemoryConfigSource {
    state: Arc<Mutex<MemoryState>>,
    revision_calls: Arc<AtomicUsize>,
    read_calls: Arc<AtomicUsize>,
}

impl MemoryConfigSource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: &str) -> Self {
        let source = Self::default();
        source.replace(contents);
        source
    }

    /// Every replacement is a new revision, even with identical bytes.
    pub fn replace(&self, contents: &str) {
        let mut state = self.state.lock();
        state.contents = Some(contents.as_bytes().to_vec());
        state.version += 1;
    }

    pub fn delete(&self) {
        self.state.lock().contents = None;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.state.lock().contents.clone()
    }

    pub fn revision_calls(&self) -> usize {
        self.revision_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

impl ConfigSource for MemoryConfigSource {
    fn revision(&self) -> io::Result<Option<Revision>> {
        self.revision_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(state.contents.as_ref().map(|c| Revision {
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(state.version),
            len: c.len() as u64,
        }))
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .contents
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config"))
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        state.contents = Some(bytes.to_vec());
        state.version += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
