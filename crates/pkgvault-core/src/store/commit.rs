//! Atomic promotion of a staging directory into its final slot, plus the
//! bounded rename retry policy it rides on.
//!
//! Cross-process safety rests on three facts: staging names are unique per
//! attempt, a same-volume directory rename is atomic, and content for a
//! given integrity is immutable, so the first committer wins and everyone
//! else can discard their redundant work.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::StoreError;
use crate::utils::uniq_id;

/// Rename retries for transient file locking, a Windows-only concern.
/// Elsewhere any rename failure is terminal on the first attempt.
pub const RENAME_RETRIES: u32 = if cfg!(windows) { 10 } else { 0 };

/// Delay between rename attempts.
pub const RENAME_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Run `op`; on failure, while `tries` remain and `is_retryable` accepts
/// the error, wait and run it again. The predicate is consulted on every
/// attempt with the same parameters.
pub fn retry<T, F, P>(
    mut op: F,
    mut is_retryable: P,
    mut tries: u32,
    wait: Duration,
) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
    P: FnMut(&io::Error) -> bool,
{
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if tries == 0 || !is_retryable(&err) {
                    return Err(err);
                }
                tries -= 1;
                thread::sleep(wait);
            }
        }
    }
}

/// EACCES/EPERM-style contention, seen on Windows when a scanner holds a
/// handle on the directory being renamed.
fn is_transient(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// `<path>.<tag>-<uniq>` sibling used for staging ("tmp") and vacated
/// entries ("remove"). Fresh suffix per call so concurrent writers never
/// collide before the commit point.
pub fn sibling(path: &Path, tag: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}-{}", tag, uniq_id()));
    PathBuf::from(name)
}

/// Promote `staging` into `content_path`. When `existed`, the current
/// entry is first vacated to a uniquely-named sibling: renaming onto a
/// non-empty directory is not reliable across platforms, so the slot must
/// be empty before the commit rename.
///
/// Returns false when a concurrent writer committed first; this writer's
/// staged work is discarded and the caller treats the store as successful,
/// since content for one integrity is byte-identical across writers.
pub fn commit(staging: &Path, content_path: &Path, existed: bool) -> Result<bool, StoreError> {
    let superseded = if existed {
        let aside = sibling(content_path, "remove");
        match retry(
            || fs::rename(content_path, &aside),
            is_transient,
            RENAME_RETRIES,
            RENAME_RETRY_DELAY,
        ) {
            Ok(()) => Some(aside),
            // A concurrent writer vacated the slot between our probe and
            // the rename; the slot is empty either way.
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(StoreError::io("vacate existing entry", content_path, err)),
        }
    } else {
        None
    };

    let mut peer_won = false;
    let result = retry(
        || fs::rename(staging, content_path),
        |err| {
            if err.kind() != io::ErrorKind::PermissionDenied {
                return false;
            }
            // Retry only while the destination is still absent; once it
            // appears, a concurrent writer got there first.
            peer_won = content_path.exists();
            !peer_won
        },
        RENAME_RETRIES,
        RENAME_RETRY_DELAY,
    );

    let won = match result {
        Ok(()) => true,
        Err(err) => {
            // ENOTEMPTY/EEXIST mean the destination was occupied at the
            // instant of the rename, which is itself proof a peer
            // committed; peer_won carries the same proof for the EPERM
            // path. No re-stat here: the winner may already be getting
            // vacated by yet another writer.
            let lost = peer_won
                || err.kind() == io::ErrorKind::DirectoryNotEmpty
                || err.kind() == io::ErrorKind::AlreadyExists;
            if !lost {
                return Err(StoreError::io("commit staging directory", staging, err));
            }
            // All that hard work down the drain; someone else did it first.
            let _ = fs::remove_dir_all(staging);
            false
        }
    };

    if let Some(aside) = superseded {
        // Cleanup only; a failure here must not fail the store.
        let _ = fs::remove_dir_all(&aside);
    }

    Ok(won)
}
