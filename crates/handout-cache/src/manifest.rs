//! Per-context bookkeeping of the committed asset set.
//!
//! Each context persists a small JSON manifest next to its `files/`
//! directory, recording the asset names and declared mtimes of the last
//! successful commit. [`Context::sync`](crate::Context::sync) compares the
//! storage directory against this record to distinguish cache corruption
//! from untracked junk.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Current manifest format version. Increment on breaking changes.
pub const MANIFEST_VERSION: u32 = 1;

/// File name of the manifest inside a context directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// The committed asset set of one context: name to declared mtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextManifest {
    /// Manifest format version.
    pub version: u32,
    /// Asset names mapped to the mtime declared at their last commit.
    pub assets: BTreeMap<String, SystemTime>,
}

impl ContextManifest {
    /// Create an empty manifest at the current format version.
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            assets: BTreeMap::new(),
        }
    }

    /// Returns `true` if the manifest records the given asset.
    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Load the manifest at `path`.
    ///
    /// Returns `Ok(None)` if no manifest exists (a context that has never
    /// committed). A manifest that exists but cannot be decoded is
    /// corruption, not a miss: the cache wrote it, so it must parse.
    pub fn load(path: &Path) -> CacheResult<Option<Self>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest: Self = serde_json::from_slice(&raw).map_err(|e| CacheError::CorruptCache {
            path: path.to_path_buf(),
            reason: format!("unreadable manifest: {e}"),
        })?;

        if manifest.version != MANIFEST_VERSION {
            return Err(CacheError::CorruptCache {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported manifest version {} (expected {})",
                    manifest.version, MANIFEST_VERSION
                ),
            });
        }

        Ok(Some(manifest))
    }

    /// Write the manifest to `path`, replacing any previous one.
    pub fn save(&self, path: &Path) -> CacheResult<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }
}

impl Default for ContextManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);

        let mut manifest = ContextManifest::new();
        manifest.assets.insert("flag.txt".to_string(), t(5));
        manifest.assets.insert("handout.zip".to_string(), t(100));
        manifest.save(&path).unwrap();

        let loaded = ContextManifest::load(&path).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.contains("flag.txt"));
        assert!(!loaded.contains("missing"));
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        assert!(ContextManifest::load(&path).unwrap().is_none());
    }

    #[test]
    fn load_garbage_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, b"not json at all").unwrap();

        let err = ContextManifest::load(&path).unwrap_err();
        assert!(matches!(err, CacheError::CorruptCache { .. }));
    }

    #[test]
    fn load_future_version_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);

        let mut manifest = ContextManifest::new();
        manifest.version = MANIFEST_VERSION + 1;
        manifest.save(&path).unwrap();

        let err = ContextManifest::load(&path).unwrap_err();
        assert!(matches!(err, CacheError::CorruptCache { .. }));
    }

    #[test]
    fn save_replaces_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);

        let mut first = ContextManifest::new();
        first.assets.insert("a".to_string(), t(1));
        first.save(&path).unwrap();

        let second = ContextManifest::new();
        second.save(&path).unwrap();

        let loaded = ContextManifest::load(&path).unwrap().unwrap();
        assert!(loaded.assets.is_empty());
    }
}
