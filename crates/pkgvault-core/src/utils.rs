//! Logging and small shared helpers.

use chrono::Local;
use rand::Rng;

/// Quiet mode: PKGVAULT_LOG=quiet silences informational logs.
pub fn is_quiet() -> bool {
    std::env::var("PKGVAULT_LOG")
        .map(|v| v.eq_ignore_ascii_case("quiet"))
        .unwrap_or(false)
}

pub fn log(message: &str) {
    if is_quiet() {
        return;
    }
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    println!("[{}] {}", timestamp, message);
}

pub fn log_error(message: &str) {
    eprintln!("{}", message);
}

/// Unique suffix for staging and superseded directory names. Combines
/// process id and randomness so concurrent processes never collide.
pub fn uniq_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:x}-{:08x}", std::process::id(), rng.gen::<u32>())
}
