//! The central store façade: lazy lookup, tar-stream store, replication,
//! and maintenance sweep of orphaned work directories.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;

use crate::error::StoreError;
use crate::store::commit;
use crate::store::extract;
use crate::store::integrity::IntegrityAddress;
use crate::store::replicate::replicate_tree;
use crate::store::tree::DirectoryNode;
use crate::utils::log;

/// Serialized tree descriptor beside the payload. A readable, parseable
/// tree file is the sole authoritative signal that an address is stored.
pub const TREE_FILE: &str = "tree.json";

/// Subdirectory holding the extracted payload, wrapper dir stripped.
pub const PACKAGE_DIR: &str = "package";

/// A resolved store entry. `tree` stays unset until a successful store or
/// lazy probe proves the entry is committed on disk; it is set at most once
/// per process and the cached entry is reused afterwards.
#[derive(Clone, Debug)]
pub struct StoreEntry {
    pub address: IntegrityAddress,
    pub tree: Option<DirectoryNode>,
}

/// Result of a maintenance sweep.
#[derive(Clone, Copy, Debug, Default)]
pub struct SweepStats {
    /// Orphaned staging/superseded directories removed.
    pub removed: u64,
}

/// Content-addressable store shared between processes through a single
/// directory tree. One instance owns a process-local entry cache; no
/// cross-instance coordination beyond the on-disk commit protocol.
pub struct CentralStore {
    central_dir: PathBuf,
    copy_fallback: bool,
    cache: DashMap<String, StoreEntry>,
}

impl CentralStore {
    pub fn new(central_dir: impl Into<PathBuf>) -> Self {
        Self {
            central_dir: central_dir.into(),
            copy_fallback: false,
            cache: DashMap::new(),
        }
    }

    /// Copy across filesystem boundaries during replicate instead of
    /// surfacing the hard-link error.
    pub fn with_copy_fallback(mut self, enabled: bool) -> Self {
        self.copy_fallback = enabled;
        self
    }

    pub fn central_dir(&self) -> &Path {
        &self.central_dir
    }

    /// Probe the on-disk slot for `integrity`. Populates the cache when a
    /// valid tree descriptor is found; I/O problems read as "not stored".
    fn load_tree(&self, integrity: &str) -> Result<StoreEntry, StoreError> {
        let address = IntegrityAddress::resolve(&self.central_dir, integrity)?;
        let mut entry = StoreEntry {
            address,
            tree: None,
        };
        if entry.address.content_path.is_dir() {
            if let Ok(raw) = fs::read_to_string(entry.address.content_path.join(TREE_FILE)) {
                if let Ok(tree) = serde_json::from_str::<DirectoryNode>(&raw) {
                    entry.tree = Some(tree);
                    self.cache.insert(integrity.to_string(), entry.clone());
                }
            }
        }
        Ok(entry)
    }

    /// True when a committed entry exists for `integrity`. Never fails:
    /// probe errors, including a malformed identifier, read as absent.
    pub fn has(&self, integrity: &str) -> bool {
        if let Some(entry) = self.cache.get(integrity) {
            if entry.tree.is_some() {
                return true;
            }
        }
        self.load_tree(integrity)
            .map(|entry| entry.tree.is_some())
            .unwrap_or(false)
    }

    /// The cached or probed entry, with its tree set.
    pub fn get_info(&self, integrity: &str) -> Result<StoreEntry, StoreError> {
        if let Some(entry) = self.cache.get(integrity) {
            if entry.tree.is_some() {
                return Ok(entry.value().clone());
            }
        }
        let entry = self.load_tree(integrity)?;
        if entry.tree.is_none() {
            return Err(StoreError::not_found(integrity));
        }
        Ok(entry)
    }

    /// The committed entry's content path. The lookup is fully resolved
    /// before the path is projected out.
    pub fn get(&self, integrity: &str) -> Result<PathBuf, StoreError> {
        let entry = self.get_info(integrity)?;
        Ok(entry.address.content_path)
    }

    /// Extract a gzipped tar stream into a fresh staging directory, then
    /// atomically promote it to the entry's slot. Safe under duplicate
    /// concurrent calls: the first committer wins and the rest concede,
    /// all returning success.
    pub fn store_tar_stream<R: Read>(&self, integrity: &str, stream: R) -> Result<(), StoreError> {
        let entry = self.load_tree(integrity)?;
        let content_path = entry.address.content_path.clone();
        // A directory without a readable tree descriptor is a corrupt
        // entry; it gets vacated and replaced like a stored one.
        let existed = content_path.is_dir();

        let staging = commit::sibling(&content_path, "tmp");
        let package_dir = staging.join(PACKAGE_DIR);
        fs::create_dir_all(&package_dir)
            .map_err(|e| StoreError::io("create staging directory", &package_dir, e))?;

        let tree = extract::extract_tar_stream(stream, &package_dir)?;

        let serialized = serde_json::to_string(&tree).map_err(|e| {
            StoreError::io(
                "serialize tree descriptor",
                &staging,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        let tree_path = staging.join(TREE_FILE);
        fs::write(&tree_path, serialized)
            .map_err(|e| StoreError::io("write tree descriptor", &tree_path, e))?;

        let won = commit::commit(&staging, &content_path, existed)?;
        if !won {
            log(&format!(
                "store: a concurrent writer already committed {}",
                integrity
            ));
        }

        // Content is identical for a given integrity, so the in-memory
        // entry is valid on both the win and concede paths.
        self.cache.insert(
            integrity.to_string(),
            StoreEntry {
                address: entry.address,
                tree: Some(tree),
            },
        );
        Ok(())
    }

    /// Recreate the stored package under `dest_dir` via hard links.
    /// Fails with NotFound, touching nothing, when no entry is committed.
    pub fn replicate(&self, integrity: &str, dest_dir: &Path) -> Result<(), StoreError> {
        let entry = self.get_info(integrity)?;
        let Some(tree) = entry.tree.as_ref() else {
            return Err(StoreError::not_found(integrity));
        };
        replicate_tree(
            tree,
            &entry.address.content_path.join(PACKAGE_DIR),
            dest_dir,
            self.copy_fallback,
        )
    }

    /// Maintenance pass: remove orphaned `*.tmp-*` staging and `*.remove-*`
    /// superseded directories older than `max_age`, left behind by crashed
    /// writers. Age-gated so a live writer's staging dir is never
    /// collected mid-extraction; individual removal errors are swallowed.
    pub fn sweep(&self, max_age: Duration) -> Result<SweepStats, StoreError> {
        let mut stats = SweepStats::default();
        if !self.central_dir.is_dir() {
            return Ok(stats);
        }
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        // Layout is <alg>/<aa>/<bb>/<entry>; orphans sit beside entries.
        for alg in subdirs(&self.central_dir) {
            for shard_a in subdirs(&alg) {
                for shard_b in subdirs(&shard_a) {
                    let Ok(items) = fs::read_dir(&shard_b) else {
                        continue;
                    };
                    for item in items.flatten() {
                        let name = item.file_name();
                        let name = name.to_string_lossy();
                        if !name.contains(".tmp-") && !name.contains(".remove-") {
                            continue;
                        }
                        let Ok(modified) = item.metadata().and_then(|m| m.modified()) else {
                            continue;
                        };
                        if modified > cutoff {
                            continue;
                        }
                        if fs::remove_dir_all(item.path()).is_ok() {
                            stats.removed += 1;
                        }
                    }
                }
            }
        }
        if stats.removed > 0 {
            log(&format!("sweep: removed {} orphaned directories", stats.removed));
        }
        Ok(stats)
    }
}

fn subdirs(path: &Path) -> Vec<PathBuf> {
    match fs::read_dir(path) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_false_for_malformed_integrity() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CentralStore::new(tmp.path());
        assert!(!store.has("definitely not an sri"));
    }

    #[test]
    fn test_get_info_not_found_on_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CentralStore::new(tmp.path());
        let err = store.get_info("sha512-AQIDBAU=").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_replicate_not_found_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CentralStore::new(tmp.path().join("store"));
        let dest = tmp.path().join("dest");
        let err = store.replicate("sha512-AQIDBAU=", &dest).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_sweep_removes_only_aged_orphans() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CentralStore::new(tmp.path());
        let leaf = tmp.path().join("sha512").join("01").join("02");
        fs::create_dir_all(leaf.join("030405")).unwrap();
        fs::create_dir_all(leaf.join("030405.tmp-dead")).unwrap();
        fs::create_dir_all(leaf.join("030405.remove-dead")).unwrap();

        // Nothing is old enough yet.
        let stats = store.sweep(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.removed, 0);

        let stats = store.sweep(Duration::ZERO).unwrap();
        assert_eq!(stats.removed, 2);
        assert!(leaf.join("030405").is_dir());
        assert!(!leaf.join("030405.tmp-dead").exists());
    }
}
