//! Content-addressable central package store.
//!
//! pnpm-style layout: one extracted copy of each package version under
//! `<centralDir>/<algorithm>/<aa>/<bb>/<rest-of-hex>`, shared across all
//! installs via hard links. Safe under concurrent multi-process writers
//! with no lock service: unique staging directories plus an atomic rename
//! as the single commit point.

mod central;
mod commit;
mod extract;
mod integrity;
mod replicate;
mod tree;

pub use central::{CentralStore, StoreEntry, SweepStats, PACKAGE_DIR, TREE_FILE};
pub use extract::{extract_tar_stream, EntryEvent, EntryKind, TreeBuilder};
pub use integrity::{compute_integrity_sha512, HashAlgorithm, IntegrityAddress};
pub use tree::{DirectoryNode, FileMeta};
