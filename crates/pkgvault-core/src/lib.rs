//! Core library for pkgvault: a content-addressable central package store.
//! One extracted copy of each package per integrity, replicated into
//! install directories by hard link. Used by the CLI binary; can be reused
//! by package-manager frontends.

pub mod config;
pub mod error;
pub mod store;
pub mod utils;

// Re-export main API for CLI
pub use config::{default_central_dir, load_config, Config};
pub use error::StoreError;
pub use store::{
    compute_integrity_sha512, CentralStore, DirectoryNode, FileMeta, HashAlgorithm,
    IntegrityAddress, StoreEntry, SweepStats, PACKAGE_DIR, TREE_FILE,
};
pub use utils::{log, log_error};
