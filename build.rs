use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    let version = describe().unwrap_or_else(|| {
        std::env::var("CARGO_PKG_VERSION")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    });

    println!("cargo:rustc-env=LANSTREAM_BUILD_VERSION={version}");
}

/// `git describe` output with the leading `v` dropped, or `None` outside a checkout.
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags", "--match", "v[0-9]*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    let raw = raw.trim();
    match raw {
        "" => None,
        tagged if tagged.starts_with('v') => Some(tagged[1..].to_string()),
        hash => Some(format!("{}+g{hash}", env!("CARGO_PKG_VERSION"))),
    }
}
