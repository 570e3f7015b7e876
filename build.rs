//! Build-script metadata injection for the CLI version surface.
//!
//! Kept dependency-free and resilient: when git or date tooling is missing,
//! stable "unknown" markers are emitted instead of failing the build.

use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=MERCATO_BUILD_GIT_HASH");
    println!("cargo:rerun-if-env-changed=MERCATO_BUILD_TIMESTAMP");

    let git_hash = std::env::var("MERCATO_BUILD_GIT_HASH")
        .ok()
        .or_else(|| run_cmd("git", &["rev-parse", "--short=12", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());
    let timestamp = std::env::var("MERCATO_BUILD_TIMESTAMP")
        .ok()
        .or_else(|| run_cmd("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]))
        .unwrap_or_else(unix_fallback_timestamp);

    println!("cargo:rustc-env=MERCATO_BUILD_GIT_HASH={git_hash}");
    println!("cargo:rustc-env=MERCATO_BUILD_TIMESTAMP={timestamp}");
}

fn unix_fallback_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|delta| delta.as_secs())
        .unwrap_or(0);
    format!("unix:{secs}")
}

fn run_cmd(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
