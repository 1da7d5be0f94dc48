use std::process::Command;

const FALLBACK_VERSION: &str = "dev";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    println!("cargo:rerun-if-env-changed=GIT_VERSION");

    let version = pinned_version()
        .or_else(git_describe)
        .unwrap_or_else(|| FALLBACK_VERSION.to_string());
    println!("cargo:rustc-env=GIT_VERSION={}", version);
}

/// Container and CI builds pass the version in since `.git` is absent there.
fn pinned_version() -> Option<String> {
    std::env::var("GIT_VERSION")
        .ok()
        .filter(|v| !v.is_empty() && v != FALLBACK_VERSION)
}

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}
