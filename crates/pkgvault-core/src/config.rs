//! Optional config from .pkgvaultrc (JSON). Env vars override the file.

use std::env;
use std::path::{Path, PathBuf};

/// Resolved store configuration. CLI flags and env override the file.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root of the shared central store.
    pub central_dir: PathBuf,
    /// Copy across filesystem boundaries instead of failing the hard link.
    pub copy_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            central_dir: default_central_dir(),
            copy_fallback: false,
        }
    }
}

/// `~/.pkgvault/_central-storage`, falling back to the current directory
/// when no home directory can be resolved.
pub fn default_central_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pkgvault")
        .join("_central-storage")
}

/// Load config from .pkgvaultrc in `dir`, then ~/.pkgvaultrc. Missing or
/// invalid file = default. `PKGVAULT_DIR` and `PKGVAULT_COPY_FALLBACK`
/// override whatever the file said.
pub fn load_config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    let home = dirs::home_dir();
    let candidates = [
        dir.join(".pkgvaultrc"),
        home.map(|h| h.join(".pkgvaultrc"))
            .unwrap_or_else(|| dir.join(".none")),
    ];
    for path in &candidates {
        if path.is_file() {
            if let Ok(s) = std::fs::read_to_string(path) {
                if let Ok(v) = serde_json::from_str::<serde_json::Value>(&s) {
                    if let Some(d) = v.get("centralDir").and_then(|x| x.as_str()) {
                        cfg.central_dir = PathBuf::from(d);
                    }
                    if let Some(b) = v.get("copyFallback").and_then(|x| x.as_bool()) {
                        cfg.copy_fallback = b;
                    }
                }
            }
            break;
        }
    }
    if let Ok(d) = env::var("PKGVAULT_DIR") {
        if !d.is_empty() {
            cfg.central_dir = PathBuf::from(d);
        }
    }
    if let Ok(b) = env::var("PKGVAULT_COPY_FALLBACK") {
        cfg.copy_fallback = matches!(b.as_str(), "1" | "true" | "TRUE");
    }
    cfg
}
