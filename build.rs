use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    println!("cargo:rerun-if-env-changed=CLOSEIO_BUILD_VERSION");

    let version = std::env::var("CLOSEIO_BUILD_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(git_version)
        .unwrap_or_else(|| format!("0.0.0-unknown-{}", build_time()));

    println!("cargo:rustc-env=CLOSEIO_VERSION={}", version);
}

/// `git describe` without the leading `v`; dirty trees get the build time appended.
fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    let version = described.strip_prefix('v').unwrap_or(described);

    match version {
        "" => None,
        v if v.ends_with("-dirty") => Some(format!("{}-{}", v, build_time())),
        v => Some(v.to_string()),
    }
}

fn build_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
