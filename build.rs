// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=QRCAM_VERSION");

    // Packagers can pin the version string
    let version = std::env::var("QRCAM_VERSION")
        .ok()
        .or_else(describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output without the leading `v`, e.g. "0.1.0-5-gabcdef1"
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Some(version.strip_prefix('v').unwrap_or(&version).to_string())
}
