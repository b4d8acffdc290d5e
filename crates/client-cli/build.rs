use std::process::Command;

fn main() {
    // Get current date in YY-MM-DD format
    let date = Command::new("date")
        .args(["+%y-%m-%d"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|_| "00-00-00".to_string());

    // Short hash of the commit being built, when there is one
    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Version shown by --version: CRATE_VERSION (YY-MM-DD, COMMIT)
    let version = format!(
        "{} ({}, {})",
        std::env::var("CARGO_PKG_VERSION").unwrap_or_default(),
        date,
        commit
    );

    println!("cargo:rustc-env=DROPSYNC_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
