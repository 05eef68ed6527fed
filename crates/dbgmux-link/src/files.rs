//! Session-scoped file-name resolution cache
//!
//! Backends report file names relative to whatever they were compiled or
//! loaded from. Resolution to absolute paths is performed by an external
//! collaborator; this cache memoizes the answers, including negative ones,
//! and is cleared whenever symbols reload (the mapping may have changed).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct FileNameCache {
    // None = known not to exist
    map: HashMap<String, Option<PathBuf>>,
}

impl FileNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolution. An empty `full_name` records a negative result
    /// so the collaborator is not asked again.
    pub fn remember_file(&mut self, file_name: impl Into<String>, full_name: Option<PathBuf>) {
        self.map.insert(file_name.into(), full_name);
    }

    /// Look up a file. Returns:
    /// - `Some((true, path))` - known, resolved
    /// - `Some((false, None))` - known not to exist
    /// - `None` - never asked; the caller should consult the resolver
    ///
    /// An absolute path that exists on disk short-circuits the cache.
    pub fn find_file(&self, file_name: &str) -> Option<(bool, Option<PathBuf>)> {
        let path = Path::new(file_name);
        if path.is_absolute() && path.is_file() {
            return Some((true, Some(path.to_path_buf())));
        }

        match self.map.get(file_name) {
            Some(Some(full)) => Some((true, Some(full.clone()))),
            Some(None) => Some((false, None)),
            None => None,
        }
    }

    /// Cleared on symbol reload: the old mapping no longer applies.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
