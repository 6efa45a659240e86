//! Embeds build metadata (commit and timestamp) for the version command.

use std::path::Path;
use std::process::Command;

use chrono::Utc;

fn main() {
    let commit = commit_from_git()
        .or_else(pinned_commit)
        .unwrap_or_else(|| "unknown".to_string());
    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    println!("cargo:rustc-env=GIT_HASH={}", commit);
    println!("cargo:rustc-env=BUILD_TIME={}", build_time);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=../Cargo.toml");
}

fn commit_from_git() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

/// Release tarballs carry no .git directory; the workspace manifest pins
/// the commit under `[workspace.metadata] git_commit` instead.
fn pinned_commit() -> Option<String> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok()?;
    let workspace_manifest = Path::new(&manifest_dir).join("../Cargo.toml");
    let contents = std::fs::read_to_string(workspace_manifest).ok()?;
    let value = contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "git_commit")
        .map(|(_, value)| value.trim().trim_matches('"').to_string())?;
    (!value.is_empty()).then_some(value)
}
