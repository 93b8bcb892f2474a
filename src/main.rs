//! Thin CLI layer: parse args, styled output, and call into pkgvault-core.
//! All errors return Result and exit with code 1 and a red message.

use clap::{crate_version, Arg, ArgAction, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pkgvault_core::{compute_integrity_sha512, load_config, CentralStore};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Spinner shown while a long store runs; None when not a TTY.
fn spinner(message: &str) -> Option<ProgressBar> {
    if !std::io::stdout().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

fn open_store(dir_flag: Option<&String>) -> CentralStore {
    let cfg = load_config(Path::new("."));
    let central_dir = dir_flag.map(PathBuf::from).unwrap_or(cfg.central_dir);
    CentralStore::new(central_dir).with_copy_fallback(cfg.copy_fallback)
}

fn main() {
    let matches = Command::new("pkgvault")
        .version(crate_version!())
        .about("Content-addressable central package store")
        .arg(
            Arg::new("dir")
                .long("dir")
                .global(true)
                .help("Store directory (overrides config and PKGVAULT_DIR)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppress informational logs"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("store")
                .about("Store a package tarball under its integrity")
                .arg(Arg::new("tarball").required(true).help("Path to a .tgz tarball"))
                .arg(
                    Arg::new("integrity")
                        .long("integrity")
                        .help("SRI string; computed (sha512) from the tarball when omitted"),
                ),
        )
        .subcommand(
            Command::new("has")
                .about("Print true/false for a committed entry")
                .arg(Arg::new("integrity").required(true)),
        )
        .subcommand(
            Command::new("path")
                .about("Print the content path of a committed entry")
                .arg(Arg::new("integrity").required(true)),
        )
        .subcommand(
            Command::new("info")
                .about("Print the tree descriptor of a committed entry")
                .arg(Arg::new("integrity").required(true)),
        )
        .subcommand(
            Command::new("replicate")
                .about("Hard-link a stored package into a destination directory")
                .arg(Arg::new("integrity").required(true))
                .arg(Arg::new("dest").required(true)),
        )
        .subcommand(
            Command::new("sweep")
                .about("Remove orphaned staging/superseded directories")
                .arg(
                    Arg::new("max-age-hours")
                        .long("max-age-hours")
                        .default_value("24")
                        .help("Only remove orphans older than this many hours"),
                ),
        )
        .get_matches();

    // Globals propagate down into the subcommand's matches, so read them
    // there to catch `pkgvault store x --dir y` as well.
    let (name, sub) = matches.subcommand().expect("subcommand required");
    if sub.get_flag("quiet") {
        env::set_var("PKGVAULT_LOG", "quiet");
    }
    let store = open_store(sub.get_one::<String>("dir"));

    let result = match name {
        "store" => {
            let tarball: &String = sub.get_one("tarball").expect("required");
            fs::read(tarball)
                .map_err(|e| format!("cannot read tarball {}: {}", tarball, e))
                .and_then(|bytes| {
                    let integrity = sub
                        .get_one::<String>("integrity")
                        .cloned()
                        .unwrap_or_else(|| compute_integrity_sha512(&bytes));
                    let pb = spinner("storing package");
                    let result = store
                        .store_tar_stream(&integrity, bytes.as_slice())
                        .map_err(|e| e.to_string());
                    if let Some(pb) = pb {
                        pb.finish_and_clear();
                    }
                    result.map(|()| {
                        success(&format!("stored {}", integrity));
                        if let Ok(path) = store.get(&integrity) {
                            dim(&path.display().to_string());
                        }
                    })
                })
        }
        "has" => {
            let integrity: &String = sub.get_one("integrity").expect("required");
            println!("{}", store.has(integrity));
            Ok(())
        }
        "path" => {
            let integrity: &String = sub.get_one("integrity").expect("required");
            store
                .get(integrity)
                .map(|path| println!("{}", path.display()))
                .map_err(|e| e.to_string())
        }
        "info" => {
            let integrity: &String = sub.get_one("integrity").expect("required");
            store
                .get_info(integrity)
                .map_err(|e| e.to_string())
                .and_then(|entry| {
                    let tree = entry.tree.ok_or_else(|| "entry has no tree".to_string())?;
                    serde_json::to_string_pretty(&tree)
                        .map(|json| println!("{}", json))
                        .map_err(|e| e.to_string())
                })
        }
        "replicate" => {
            let integrity: &String = sub.get_one("integrity").expect("required");
            let dest: &String = sub.get_one("dest").expect("required");
            store
                .replicate(integrity, Path::new(dest))
                .map(|()| success(&format!("replicated into {}", dest)))
                .map_err(|e| e.to_string())
        }
        "sweep" => {
            let hours: &String = sub.get_one("max-age-hours").expect("defaulted");
            hours
                .parse::<u64>()
                .map_err(|e| format!("invalid --max-age-hours: {}", e))
                .and_then(|hours| {
                    store
                        .sweep(Duration::from_secs(hours * 3600))
                        .map(|stats| {
                            success(&format!("removed {} orphaned directories", stats.removed))
                        })
                        .map_err(|e| e.to_string())
                })
        }
        _ => unreachable!("subcommand required"),
    };

    if let Err(msg) = result {
        error(&msg);
        std::process::exit(1);
    }
}
