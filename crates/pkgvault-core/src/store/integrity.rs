//! Integrity identifiers (SRI) and content address resolution.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha512};

use crate::error::StoreError;

/// Supported hash algorithms
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Get the name of the algorithm
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha384" => Some(HashAlgorithm::Sha384),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Width of each shard segment of the hex digest.
const SHARD_LEN: usize = 2;

/// A parsed integrity identifier resolved to its on-disk slot. Never
/// mutated after construction: identical integrity always yields an
/// identical content path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityAddress {
    pub algorithm: HashAlgorithm,
    pub hex_digest: String,
    pub content_path: PathBuf,
}

impl IntegrityAddress {
    /// Resolve an SRI string (e.g. "sha512-<base64>") to its sharded store
    /// path under `central_dir`. Pure, no I/O; the only failure mode is a
    /// malformed identifier.
    pub fn resolve(central_dir: &Path, integrity: &str) -> Result<Self, StoreError> {
        let sri = integrity.trim();
        // Multiple space-separated hashes: take the first one.
        let sri = sri.split_whitespace().next().unwrap_or(sri);

        let (alg_name, b64) = sri
            .split_once('-')
            .ok_or_else(|| StoreError::invalid_integrity(integrity, "expected <algorithm>-<base64>"))?;

        let algorithm = HashAlgorithm::parse(alg_name)
            .ok_or_else(|| StoreError::invalid_integrity(integrity, "unsupported algorithm"))?;

        let raw = BASE64
            .decode(b64)
            .map_err(|e| StoreError::invalid_integrity(integrity, e.to_string()))?;

        let hex_digest: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
        if hex_digest.len() <= SHARD_LEN * 2 {
            return Err(StoreError::invalid_integrity(integrity, "digest too short"));
        }

        let content_path = central_dir
            .join(algorithm.name())
            .join(&hex_digest[..SHARD_LEN])
            .join(&hex_digest[SHARD_LEN..SHARD_LEN * 2])
            .join(&hex_digest[SHARD_LEN * 2..]);

        Ok(Self {
            algorithm,
            hex_digest,
            content_path,
        })
    }
}

/// Compute the sha512 SRI string for raw content (npm's default algorithm).
pub fn compute_integrity_sha512(content: &[u8]) -> String {
    format!("sha512-{}", BASE64.encode(Sha512::digest(content)))
}
