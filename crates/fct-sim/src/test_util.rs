use std::process::Command;

/// Check whether we have sufficient privileges and tools (`ip`) to create
/// network namespaces. Returns `false` if the environment cannot support
/// namespace-based tests.
pub fn check_privileges() -> bool {
    // `ip netns list` succeeds unprivileged, so probe with a write.
    let probe = format!("fctprobe{}", std::process::id());
    let added = Command::new("ip")
        .args(["netns", "add", &probe])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if added {
        let _ = Command::new("ip").args(["netns", "del", &probe]).output();
    }
    added
}
