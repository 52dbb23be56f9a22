//! Build script for surrogate-daemon
//!
//! Records the short git revision as `SURROGATE_BUILD_ID` for the
//! `version` command. Builds outside a git checkout get `unknown`.

use std::process::Command;

fn main() {
    let build_id = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=SURROGATE_BUILD_ID={}", build_id);
    println!("cargo:rerun-if-changed=build.rs");
}
