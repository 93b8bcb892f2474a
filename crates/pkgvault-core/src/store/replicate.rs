//! Replication of a stored package into an install directory: recreate the
//! directory structure, then hard-link every file from the stored payload.

use std::fs;
use std::io;
use std::path::Path;

use rayon::prelude::*;

use crate::error::StoreError;
use crate::store::tree::DirectoryNode;

/// Concurrent mkdir/link operations per phase. Bounds syscall fan-out
/// while still overlapping I/O latency.
const REPLICATE_CONCURRENCY: usize = 10;

/// Recreate `tree` under `dest_dir` with files hard-linked from
/// `package_dir`. Fail-fast: the first error aborts the call, with no
/// rollback of partially created structure.
pub fn replicate_tree(
    tree: &DirectoryNode,
    package_dir: &Path,
    dest_dir: &Path,
    copy_fallback: bool,
) -> Result<(), StoreError> {
    let (dirs, files) = tree.flatten();

    fs::create_dir_all(dest_dir)
        .map_err(|e| StoreError::io("create destination directory", dest_dir, e))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REPLICATE_CONCURRENCY)
        .build()
        .map_err(|e| {
            StoreError::io(
                "build replicate pool",
                dest_dir,
                io::Error::new(io::ErrorKind::Other, e),
            )
        })?;

    pool.install(|| {
        dirs.par_iter().try_for_each(|dir| {
            let target = dest_dir.join(dir);
            fs::create_dir_all(&target)
                .map_err(|e| StoreError::io("create directory", &target, e))
        })
    })?;

    pool.install(|| {
        files.par_iter().try_for_each(|file| {
            link_file(&package_dir.join(file), &dest_dir.join(file), copy_fallback)
        })
    })
}

/// Hard-link `src` to `dest`. Crossing a filesystem boundary fails
/// distinctly rather than silently copying; `copy_fallback` opts into a
/// reflink-or-copy instead.
fn link_file(src: &Path, dest: &Path, copy_fallback: bool) -> Result<(), StoreError> {
    match fs::hard_link(src, dest) {
        Ok(()) => Ok(()),
        Err(err) if copy_fallback && err.kind() == io::ErrorKind::CrossesDevices => {
            reflink_copy::reflink_or_copy(src, dest)
                .map(|_| ())
                .map_err(|e| StoreError::io("copy across filesystems", dest, e))
        }
        Err(err) => Err(StoreError::io("hard link file", dest, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tree::FileMeta;

    fn sample_tree() -> DirectoryNode {
        let mut root = DirectoryNode::default();
        root.files.insert(
            "index.js".to_string(),
            FileMeta {
                size: 10,
                mtime: 1_700_000_000,
                cksum: None,
            },
        );
        root.ensure_dir(["lib"]).files.insert(
            "a.js".to_string(),
            FileMeta {
                size: 5,
                mtime: 1_700_000_000,
                cksum: None,
            },
        );
        root
    }

    fn write_payload(package_dir: &Path) {
        fs::create_dir_all(package_dir.join("lib")).unwrap();
        fs::write(package_dir.join("index.js"), "0123456789").unwrap();
        fs::write(package_dir.join("lib").join("a.js"), "01234").unwrap();
    }

    #[cfg(unix)]
    fn same_inode(a: &Path, b: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;
        let (ma, mb) = (fs::metadata(a).unwrap(), fs::metadata(b).unwrap());
        ma.dev() == mb.dev() && ma.ino() == mb.ino()
    }

    #[test]
    fn test_replicate_recreates_structure() {
        let tmp = tempfile::tempdir().unwrap();
        let package_dir = tmp.path().join("package");
        let dest = tmp.path().join("node_modules").join("pkg");
        write_payload(&package_dir);

        replicate_tree(&sample_tree(), &package_dir, &dest, false).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("index.js")).unwrap(),
            "0123456789"
        );
        assert_eq!(
            fs::read_to_string(dest.join("lib").join("a.js")).unwrap(),
            "01234"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_replicated_files_are_hard_links() {
        let tmp = tempfile::tempdir().unwrap();
        let package_dir = tmp.path().join("package");
        let dest = tmp.path().join("out");
        write_payload(&package_dir);

        replicate_tree(&sample_tree(), &package_dir, &dest, false).unwrap();

        assert!(same_inode(
            &package_dir.join("index.js"),
            &dest.join("index.js")
        ));
        assert!(same_inode(
            &package_dir.join("lib").join("a.js"),
            &dest.join("lib").join("a.js")
        ));
    }

    #[test]
    fn test_missing_payload_file_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let package_dir = tmp.path().join("package");
        fs::create_dir_all(&package_dir).unwrap();
        // Tree names files the payload does not contain.
        let err =
            replicate_tree(&sample_tree(), &package_dir, &tmp.path().join("out"), false)
                .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
