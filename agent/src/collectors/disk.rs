use std::path::Path;

use anyhow::{Context, Result};
use nix::sys::statvfs::statvfs;
use tracing::info;

use super::{round2, UsageInfo};
use crate::aspects::or_default;

/// Filesystem usage for the filesystem containing `path`, or zeros on failure.
pub fn usage(path: &Path) -> UsageInfo {
    or_default("disk_usage", || read_usage(path), UsageInfo::default)
}

fn read_usage(path: &Path) -> Result<UsageInfo> {
    let stat = statvfs(path).with_context(|| format!("statvfs failed for {}", path.display()))?;

    let fragment = stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * fragment;
    let free = stat.blocks_available() as u64 * fragment;

    let usage = usage_from_bytes(total, free)
        .with_context(|| format!("{} reports zero size", path.display()))?;

    info!(
        path = %path.display(),
        percent = usage.percent,
        used_kb = usage.kb,
        "Disk usage calculated"
    );
    Ok(usage)
}

/// Usage report from total and free (available to unprivileged users) bytes.
fn usage_from_bytes(total: u64, free: u64) -> Result<UsageInfo> {
    if total == 0 {
        anyhow::bail!("total size is zero");
    }
    let used = total.saturating_sub(free);
    let used_kb = used / 1024;
    Ok(UsageInfo {
        percent: round2(used as f64 / total as f64 * 100.0),
        kb: used_kb,
        mb: round2(used_kb as f64 / 1024.0),
        gb: round2(used_kb as f64 / (1024.0 * 1024.0)),
    })
}
