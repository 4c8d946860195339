//! Build script for mergerbot: embeds a human-readable version string in
//! `BUILD_INFO_HUMAN` for `--version`.
//!
//! The string is `<crate version> (<git version>) <rustc version>`. The git
//! part is `git describe --tags --always --dirty` when a tag is reachable,
//! otherwise a pseudo-version `v<crate version>-<timestamp>-<commit>`
//! with a `+dirty` suffix for uncommitted changes. Clean builds use the
//! commit timestamp, dirty builds or builds outside git use the build time.

use std::process::Command;

use chrono::Utc;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    ["src", "build.rs", "Cargo.toml", "Cargo.lock"]
        .iter()
        .for_each(|path| println!("cargo:rerun-if-changed={path}"));

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", build_info());
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `None` when git is unavailable. `.cargo-ok`, written by
/// `cargo install --git`, does not count as a change.
fn is_dirty() -> Option<bool> {
    run("git", &["status", "--porcelain"])
        .map(|status| status.lines().any(|line| line.get(3..) != Some(".cargo-ok")))
        .or_else(|| run("git", &["rev-parse", "HEAD"]).map(|_| false))
}

fn pseudo_version() -> String {
    let commit =
        run("git", &["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let dirty = is_dirty();
    let now = || Utc::now().format(TIMESTAMP_FORMAT).to_string();

    let timestamp = match dirty {
        Some(false) => run("git", &["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(now),
        _ => now(),
    };
    let suffix = if dirty == Some(true) { "+dirty" } else { "" };

    format!("v{}-{timestamp}-{commit}{suffix}", env!("CARGO_PKG_VERSION"))
}

fn git_version() -> String {
    match run("git", &["describe", "--tags", "--always", "--dirty"]) {
        Some(desc) if desc.contains('v') || desc.contains("-g") => desc,
        _ => pseudo_version(),
    }
}

fn build_info() -> String {
    [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        Some(format!("({})", git_version())),
        run("rustc", &["--version"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
