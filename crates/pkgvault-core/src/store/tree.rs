//! Package tree model and its `tree.json` wire format.
//!
//! Each directory serializes as an object whose `"/"` key maps file names
//! to `{ "z": size, "m": mtime, "$": cksum-or-false }`, with one extra key
//! per subdirectory mapping to the same shape recursively. The format is
//! shared across store instances, so it must round-trip bit-for-bit.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Per-file metadata recorded from the archive entry header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    /// File size in bytes.
    pub size: u64,
    /// Modification time truncated to whole seconds. Sub-second precision
    /// is deliberately discarded so the serialized tree stays comparable
    /// across repackaging.
    pub mtime: u64,
    /// Tar header checksum, present only when the header's checksum
    /// validated.
    pub cksum: Option<u64>,
}

/// One directory of a stored package: its direct files plus nested
/// subdirectories. Strictly tree-shaped; insertion order is irrelevant
/// (BTreeMap keeps serialization deterministic).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    pub files: BTreeMap<String, FileMeta>,
    pub dirs: BTreeMap<String, DirectoryNode>,
}

impl DirectoryNode {
    /// Walk down `segments`, creating intermediate nodes as needed, and
    /// return the node at the end of the path.
    pub fn ensure_dir<'a, I>(&mut self, segments: I) -> &mut DirectoryNode
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for seg in segments {
            node = node.dirs.entry(seg.to_string()).or_default();
        }
        node
    }

    /// Flatten into (directories, files) path lists relative to this node.
    /// The node itself is excluded from the directory list; a node's own
    /// files come before its subdirectories' contents.
    pub fn flatten(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        self.flatten_into(&PathBuf::new(), &mut dirs, &mut files);
        (dirs, files)
    }

    fn flatten_into(&self, base: &PathBuf, dirs: &mut Vec<PathBuf>, files: &mut Vec<PathBuf>) {
        for name in self.files.keys() {
            files.push(base.join(name));
        }
        for (name, node) in &self.dirs {
            let sub = base.join(name);
            dirs.push(sub.clone());
            node.flatten_into(&sub, dirs, files);
        }
    }

    /// Total number of files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(DirectoryNode::file_count).sum::<usize>()
    }
}

impl Serialize for FileMeta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("z", &self.size)?;
        map.serialize_entry("m", &self.mtime)?;
        match self.cksum {
            Some(cksum) => map.serialize_entry("$", &cksum)?,
            None => map.serialize_entry("$", &false)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FileMeta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // "$" is a number when the archive checksum validated, false when not.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum CksumField {
            Value(u64),
            Absent(bool),
        }

        struct MetaVisitor;

        impl<'de> Visitor<'de> for MetaVisitor {
            type Value = FileMeta;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a file meta object with z, m and $ keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FileMeta, A::Error> {
                let mut size = None;
                let mut mtime = None;
                let mut cksum = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "z" => size = Some(map.next_value()?),
                        "m" => mtime = Some(map.next_value()?),
                        "$" => {
                            cksum = match map.next_value::<CksumField>()? {
                                CksumField::Value(v) => Some(v),
                                CksumField::Absent(_) => None,
                            }
                        }
                        _ => {
                            let _ = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(FileMeta {
                    size: size.ok_or_else(|| de::Error::missing_field("z"))?,
                    mtime: mtime.ok_or_else(|| de::Error::missing_field("m"))?,
                    cksum,
                })
            }
        }

        deserializer.deserialize_map(MetaVisitor)
    }
}

impl Serialize for DirectoryNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dirs.len() + 1))?;
        map.serialize_entry("/", &self.files)?;
        for (name, node) in &self.dirs {
            map.serialize_entry(name, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DirectoryNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeVisitor;

        impl<'de> Visitor<'de> for NodeVisitor {
            type Value = DirectoryNode;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a directory object with a \"/\" file map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DirectoryNode, A::Error> {
                let mut node = DirectoryNode::default();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "/" {
                        node.files = map.next_value()?;
                    } else {
                        node.dirs.insert(key, map.next_value()?);
                    }
                }
                Ok(node)
            }
        }

        deserializer.deserialize_map(NodeVisitor)
    }
}
