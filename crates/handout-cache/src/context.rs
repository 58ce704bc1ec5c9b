//! A context: one isolated namespace within the asset cache.
//!
//! A [`Context`] is a typed handle onto a subdirectory of the cache root.
//! The durable state lives entirely on disk; the handle itself only carries
//! paths and the in-process transaction flag, and can be re-derived at any
//! time from `(root, name)`.
//!
//! Layout invariant: everything directly inside a context's `files/`
//! directory is a regular file or a symlink resolving to one. Anything else
//! is either fatal ([`CorruptCache`](crate::CacheError::CorruptCache)) or
//! self-healed with a warning, depending on the operation.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::manifest::{ContextManifest, MANIFEST_FILE};
use crate::names::{validate_asset_name, validate_context_name};
use crate::transaction::Transaction;

/// Subdirectory of a context that holds the asset files themselves.
pub(crate) const FILES_SUBDIR: &str = "files";

/// What a directory entry turned out to be, relative to the layout invariant.
pub(crate) enum EntryKind {
    /// Regular file, or symlink resolving to one.
    File,
    /// A directory (removal needs `remove_dir_all`).
    Directory,
    /// Broken symlink, symlink to a non-file, device node, ...
    Other(&'static str),
}

impl EntryKind {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::File => "regular file",
            Self::Directory => "directory",
            Self::Other(what) => what,
        }
    }
}

/// Classify a directory entry against the "regular file or symlink to one"
/// invariant. Symlinks are judged by their target.
pub(crate) fn classify_entry(path: &Path) -> CacheResult<EntryKind> {
    let file_type = fs::symlink_metadata(path)?.file_type();

    if file_type.is_file() {
        return Ok(EntryKind::File);
    }
    if file_type.is_symlink() {
        return match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(EntryKind::File),
            Ok(_) => Ok(EntryKind::Other("symlink to a non-file")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Other("broken symlink")),
            Err(e) => Err(e.into()),
        };
    }
    if file_type.is_dir() {
        return Ok(EntryKind::Directory);
    }
    Ok(EntryKind::Other("special file"))
}

/// Build the corruption error for an entry that failed classification.
pub(crate) fn corrupt_entry(path: PathBuf, kind: &EntryKind) -> CacheError {
    CacheError::CorruptCache {
        path,
        reason: format!("{} where a regular file was expected", kind.describe()),
    }
}

/// Remove an entry of any kind from the cache.
fn remove_any(path: &Path, kind: &EntryKind) -> io::Result<()> {
    match kind {
        EntryKind::Directory => fs::remove_dir_all(path),
        _ => fs::remove_file(path),
    }
}

/// One namespace within the asset cache.
///
/// Obtained from [`AssetCache::create_context`](crate::AssetCache::create_context).
/// At most one [`Transaction`] may be open per handle at a time; the rule is
/// reject, not queue.
#[derive(Debug)]
pub struct Context {
    name: String,
    dir: PathBuf,
    files_dir: PathBuf,
    txn_active: AtomicBool,
}

impl Context {
    /// Open (creating if absent) the context named `name` under `root`.
    pub(crate) fn open(root: &Path, name: &str) -> CacheResult<Self> {
        validate_context_name(name)?;
        let dir = root.join(name);
        let files_dir = dir.join(FILES_SUBDIR);
        fs::create_dir_all(&files_dir)?;
        Ok(Self {
            name: name.to_string(),
            dir,
            files_dir,
            txn_active: AtomicBool::new(false),
        })
    }

    /// The context's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub(crate) fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Open a transaction declaring this context's next asset set.
    ///
    /// Fails with [`TransactionInProgress`](CacheError::TransactionInProgress)
    /// if one is already open on this handle. The flag is released when the
    /// transaction commits or is dropped.
    pub fn transaction(&self) -> CacheResult<Transaction<'_>> {
        if self
            .txn_active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(CacheError::TransactionInProgress {
                context: self.name.clone(),
            });
        }
        Ok(Transaction::new(self))
    }

    pub(crate) fn release_transaction(&self) {
        self.txn_active.store(false, Ordering::Release);
    }

    /// List the assets currently present, sorted by name.
    ///
    /// Fails with [`CorruptCache`](CacheError::CorruptCache) if anything in
    /// the storage directory is not a regular file.
    pub fn ls(&self) -> CacheResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.files_dir)? {
            let entry = entry?;
            let path = entry.path();
            match classify_entry(&path)? {
                EntryKind::File => names.push(entry.file_name().to_string_lossy().into_owned()),
                kind => return Err(corrupt_entry(path, &kind)),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Path where the named asset is (or would be) stored.
    ///
    /// Does not check existence; callers that need a strict lookup should
    /// use [`mtime`](Context::mtime) or open the returned path.
    pub fn get(&self, name: &str) -> CacheResult<PathBuf> {
        validate_asset_name(name)?;
        Ok(self.files_dir.join(name))
    }

    /// Modification time of the named asset.
    ///
    /// For symlinked assets this follows the link, which is also how the
    /// reconciliation algorithm compares freshness.
    pub fn mtime(&self, name: &str) -> CacheResult<SystemTime> {
        let path = self.get(name)?;
        let meta = fs::metadata(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CacheError::AssetNotFound {
                    name: name.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(meta.modified()?)
    }

    /// Remove every entry from this context's storage.
    ///
    /// Anomalous entries (directories and other non-files) are removed too,
    /// with a warning rather than a failure, so the context always returns
    /// to a validated empty state. The manifest is deleted along with the
    /// files.
    pub fn clear(&self) -> CacheResult<()> {
        for entry in fs::read_dir(&self.files_dir)? {
            let entry = entry?;
            let path = entry.path();
            let kind = classify_entry(&path)?;
            if !matches!(kind, EntryKind::File) {
                warn!(
                    path = %path.display(),
                    kind = kind.describe(),
                    "unexpected entry in cache; removing"
                );
            }
            remove_any(&path, &kind)?;
        }
        match fs::remove_file(self.manifest_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Reconcile the storage directory against the context's manifest.
    ///
    /// With `check = true` any disagreement — a non-file entry, a file the
    /// manifest does not track, or a tracked asset whose file is gone — is
    /// [`CorruptCache`](CacheError::CorruptCache). With `check = false` the
    /// same findings are self-healed with a warning: anomalies and untracked
    /// files are removed, and stale manifest rows are pruned.
    pub fn sync(&self, check: bool) -> CacheResult<()> {
        let mut manifest = ContextManifest::load(&self.manifest_path())?.unwrap_or_default();

        let mut on_disk = BTreeSet::new();
        for entry in fs::read_dir(&self.files_dir)? {
            let entry = entry?;
            let path = entry.path();
            let kind = classify_entry(&path)?;
            match kind {
                EntryKind::File => {
                    on_disk.insert(entry.file_name().to_string_lossy().into_owned());
                }
                kind if check => return Err(corrupt_entry(path, &kind)),
                kind => {
                    warn!(
                        path = %path.display(),
                        kind = kind.describe(),
                        "removing anomalous entry from cache"
                    );
                    remove_any(&path, &kind)?;
                }
            }
        }

        // Files present on disk that the manifest does not track.
        for name in &on_disk {
            if !manifest.contains(name) {
                let path = self.files_dir.join(name);
                if check {
                    return Err(CacheError::CorruptCache {
                        path,
                        reason: "asset not recorded in the context manifest".to_string(),
                    });
                }
                warn!(path = %path.display(), "removing untracked file from cache");
                fs::remove_file(&path)?;
            }
        }

        // Tracked assets whose file has disappeared.
        let missing: Vec<String> = manifest
            .assets
            .keys()
            .filter(|name| !on_disk.contains(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            if check {
                return Err(CacheError::CorruptCache {
                    path: self.files_dir.join(&missing[0]),
                    reason: "tracked asset missing from cache storage".to_string(),
                });
            }
            for name in missing {
                warn!(context = %self.name, asset = %name, "dropping manifest entry for missing asset");
                manifest.assets.remove(&name);
            }
            manifest.save(&self.manifest_path())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn make_context() -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::open(dir.path(), "challenge").unwrap();
        (dir, ctx)
    }

    #[test]
    fn open_creates_storage_directory() {
        let (_dir, ctx) = make_context();
        assert!(ctx.files_dir().is_dir());
        assert_eq!(ctx.name(), "challenge");
    }

    #[test]
    fn open_rejects_invalid_name() {
        let dir = tempfile::tempdir().unwrap();
        let result = Context::open(dir.path(), "bad/../name");
        assert!(matches!(result, Err(CacheError::InvalidName { .. })));
    }

    #[test]
    fn ls_empty_context() {
        let (_dir, ctx) = make_context();
        assert!(ctx.ls().unwrap().is_empty());
    }

    #[test]
    fn get_returns_path_without_checking_existence() {
        let (_dir, ctx) = make_context();
        let path = ctx.get("flag.txt").unwrap();
        assert!(path.ends_with("challenge/files/flag.txt"));
        assert!(!path.exists());
    }

    #[test]
    fn get_rejects_invalid_name() {
        let (_dir, ctx) = make_context();
        assert!(matches!(
            ctx.get("../escape"),
            Err(CacheError::InvalidName { .. })
        ));
    }

    #[test]
    fn mtime_of_missing_asset() {
        let (_dir, ctx) = make_context();
        assert!(matches!(
            ctx.mtime("nope.txt"),
            Err(CacheError::AssetNotFound { .. })
        ));
    }

    #[test]
    fn ls_detects_directory_in_storage() {
        let (_dir, ctx) = make_context();
        fs::create_dir(ctx.files_dir().join("oops")).unwrap();
        assert!(matches!(ctx.ls(), Err(CacheError::CorruptCache { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn ls_detects_broken_symlink() {
        let (_dir, ctx) = make_context();
        std::os::unix::fs::symlink("/nonexistent/target", ctx.files_dir().join("dangling"))
            .unwrap();
        assert!(matches!(ctx.ls(), Err(CacheError::CorruptCache { .. })));
    }

    #[test]
    fn clear_removes_files_and_anomalies() {
        let (_dir, ctx) = make_context();
        fs::write(ctx.files_dir().join("a.txt"), b"a").unwrap();
        fs::create_dir(ctx.files_dir().join("junk")).unwrap();
        fs::write(ctx.files_dir().join("junk").join("nested"), b"x").unwrap();

        ctx.clear().unwrap();
        assert!(ctx.ls().unwrap().is_empty());
    }

    #[test]
    fn clear_removes_manifest() {
        let (_dir, ctx) = make_context();
        let mut txn = ctx.transaction().unwrap();
        txn.add("a.txt", t(1), b"a".to_vec()).unwrap();
        txn.commit().unwrap();
        assert!(ctx.manifest_path().is_file());

        ctx.clear().unwrap();
        assert!(!ctx.manifest_path().exists());
    }

    #[test]
    fn second_transaction_is_rejected() {
        let (_dir, ctx) = make_context();
        let _txn = ctx.transaction().unwrap();
        assert!(matches!(
            ctx.transaction(),
            Err(CacheError::TransactionInProgress { .. })
        ));
    }

    #[test]
    fn transaction_allowed_after_drop() {
        let (_dir, ctx) = make_context();
        let txn = ctx.transaction().unwrap();
        drop(txn);
        assert!(ctx.transaction().is_ok());
    }

    #[test]
    fn transaction_allowed_after_commit() {
        let (_dir, ctx) = make_context();
        let mut txn = ctx.transaction().unwrap();
        txn.commit().unwrap();
        // The committed transaction is still in scope, but the context is free.
        let again = ctx.transaction();
        assert!(again.is_ok());
        drop(txn);
    }

    #[test]
    fn sync_passes_on_clean_state() {
        let (_dir, ctx) = make_context();
        let mut txn = ctx.transaction().unwrap();
        txn.add("a.txt", t(1), b"a".to_vec()).unwrap();
        txn.commit().unwrap();

        ctx.sync(true).unwrap();
        ctx.sync(false).unwrap();
        assert_eq!(ctx.ls().unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn sync_check_flags_untracked_file() {
        let (_dir, ctx) = make_context();
        fs::write(ctx.files_dir().join("stray.bin"), b"junk").unwrap();

        assert!(matches!(ctx.sync(true), Err(CacheError::CorruptCache { .. })));
    }

    #[test]
    fn sync_removes_untracked_file() {
        let (_dir, ctx) = make_context();
        let mut txn = ctx.transaction().unwrap();
        txn.add("kept.txt", t(1), b"keep".to_vec()).unwrap();
        txn.commit().unwrap();
        fs::write(ctx.files_dir().join("stray.bin"), b"junk").unwrap();

        ctx.sync(false).unwrap();
        assert_eq!(ctx.ls().unwrap(), vec!["kept.txt"]);
        ctx.sync(true).unwrap();
    }

    #[test]
    fn sync_check_flags_missing_tracked_asset() {
        let (_dir, ctx) = make_context();
        let mut txn = ctx.transaction().unwrap();
        txn.add("gone.txt", t(1), b"bye".to_vec()).unwrap();
        txn.commit().unwrap();
        fs::remove_file(ctx.files_dir().join("gone.txt")).unwrap();

        assert!(matches!(ctx.sync(true), Err(CacheError::CorruptCache { .. })));
    }

    #[test]
    fn sync_prunes_manifest_for_missing_asset() {
        let (_dir, ctx) = make_context();
        let mut txn = ctx.transaction().unwrap();
        txn.add("gone.txt", t(1), b"bye".to_vec()).unwrap();
        txn.commit().unwrap();
        fs::remove_file(ctx.files_dir().join("gone.txt")).unwrap();

        ctx.sync(false).unwrap();
        // Healed: the manifest no longer tracks the asset.
        ctx.sync(true).unwrap();
        let manifest = ContextManifest::load(&ctx.manifest_path()).unwrap().unwrap();
        assert!(!manifest.contains("gone.txt"));
    }

    #[test]
    fn sync_check_flags_directory_anomaly() {
        let (_dir, ctx) = make_context();
        fs::create_dir(ctx.files_dir().join("oops")).unwrap();

        assert!(matches!(ctx.sync(true), Err(CacheError::CorruptCache { .. })));
        ctx.sync(false).unwrap();
        assert!(ctx.ls().unwrap().is_empty());
    }
}
