//! Tar stream extraction: unpack payload files into a staging directory
//! while building the package tree in the same single pass.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::StoreError;
use crate::store::tree::{DirectoryNode, FileMeta};

/// Leading path components stripped from every entry (the archive's
/// conventional top-level wrapper directory, e.g. "package/").
const STRIP_COMPONENTS: usize = 1;

/// What an archive entry contributes to the tree.
#[derive(Clone, Debug)]
pub enum EntryKind {
    /// Ensures a directory node; contributes no file metadata.
    Directory,
    /// Recorded under the parent directory's file map.
    File(FileMeta),
}

/// One archive entry event. `segments` is the entry path split on
/// separators with the wrapper directory already stripped.
#[derive(Clone, Debug)]
pub struct EntryEvent {
    pub segments: Vec<String>,
    pub kind: EntryKind,
}

/// Incrementally builds a [`DirectoryNode`] from a stream of entry events.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    root: DirectoryNode,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: EntryEvent) {
        let segments: Vec<&str> = event
            .segments
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        match event.kind {
            EntryKind::Directory => {
                self.root.ensure_dir(segments.iter().copied());
            }
            EntryKind::File(meta) => {
                let Some((name, parents)) = segments.split_last() else {
                    return;
                };
                let node = self.root.ensure_dir(parents.iter().copied());
                node.files.insert((*name).to_string(), meta);
            }
        }
    }

    pub fn finish(self) -> DirectoryNode {
        self.root
    }
}

/// Extract a gzipped tarball into `package_dir`, returning the finished
/// tree. Stream/decode failures abort extraction; whatever was already
/// unpacked is left in place for the sweep pass to collect.
pub fn extract_tar_stream<R: Read>(
    stream: R,
    package_dir: &Path,
) -> Result<DirectoryNode, StoreError> {
    let decoder = GzDecoder::new(stream);
    let mut archive = Archive::new(decoder);
    let mut builder = TreeBuilder::new();

    let entries = archive.entries().map_err(StoreError::stream)?;
    for entry in entries {
        let mut entry = entry.map_err(StoreError::stream)?;
        let raw = entry
            .path()
            .map_err(StoreError::stream)?
            .to_string_lossy()
            .into_owned();

        let segments: Vec<String> = raw
            .split(['/', '\\'])
            .skip(STRIP_COMPONENTS)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() || segments.iter().any(|s| s.as_str() == "..") {
            // The wrapper directory itself, or a path trying to escape it.
            continue;
        }

        let header = entry.header();
        if header.entry_type().is_dir() {
            builder.record(EntryEvent {
                segments,
                kind: EntryKind::Directory,
            });
            continue;
        }

        let meta = FileMeta {
            size: header.size().map_err(StoreError::stream)?,
            mtime: header.mtime().unwrap_or_else(|_| now_secs()),
            cksum: header.cksum().ok().map(u64::from),
        };

        let mut dest = package_dir.to_path_buf();
        for seg in &segments {
            dest.push(seg);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("create entry parent", parent, e))?;
        }
        entry
            .unpack(&dest)
            .map_err(|e| StoreError::io("unpack entry", &dest, e))?;

        builder.record(EntryEvent {
            segments,
            kind: EntryKind::File(meta),
        });
    }

    Ok(builder.finish())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gz_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_700_000_000);
            builder.append_data(&mut header, *path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extract_strips_wrapper_and_builds_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let tarball = gz_tarball(&[
            ("package/index.js", b"0123456789".as_slice()),
            ("package/lib/a.js", b"01234".as_slice()),
        ]);

        let tree = extract_tar_stream(tarball.as_slice(), tmp.path()).unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("index.js")).unwrap(),
            "0123456789"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("lib").join("a.js")).unwrap(),
            "01234"
        );

        let index = &tree.files["index.js"];
        assert_eq!(index.size, 10);
        assert_eq!(index.mtime, 1_700_000_000);
        assert!(index.cksum.is_some());

        let a = &tree.dirs["lib"].files["a.js"];
        assert_eq!(a.size, 5);
    }

    #[test]
    fn test_explicit_directory_entries_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(1_700_000_000);
        builder
            .append_data(&mut header, "package/empty/", &[] as &[u8])
            .unwrap();
        let tarball = builder.into_inner().unwrap().finish().unwrap();

        let tree = extract_tar_stream(tarball.as_slice(), tmp.path()).unwrap();
        assert!(tree.dirs.contains_key("empty"));
        assert!(tree.dirs["empty"].files.is_empty());
    }

    #[test]
    fn test_garbage_stream_is_stream_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = extract_tar_stream(&b"not a tarball"[..], tmp.path()).unwrap_err();
        assert!(matches!(err, StoreError::Stream { .. }));
    }

    #[test]
    fn test_builder_ignores_entries_outside_wrapper_root() {
        let mut builder = TreeBuilder::new();
        builder.record(EntryEvent {
            segments: vec![],
            kind: EntryKind::File(FileMeta {
                size: 1,
                mtime: 0,
                cksum: None,
            }),
        });
        assert_eq!(builder.finish(), DirectoryNode::default());
    }
}
