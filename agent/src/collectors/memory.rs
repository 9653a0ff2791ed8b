use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use super::{HostPaths, UsageInfo};
use crate::aspects::or_default;

/// Memory in use (total minus available), or zeros on failure.
pub fn usage(paths: &HostPaths) -> UsageInfo {
    or_default("memory_usage", || read_usage(paths), UsageInfo::default)
}

fn read_usage(paths: &HostPaths) -> Result<UsageInfo> {
    let path = paths.proc_root.join("meminfo");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let total_kb = field_kb(&contents, "MemTotal")?;
    let available_kb = field_kb(&contents, "MemAvailable")?;
    let usage = UsageInfo::from_kb(total_kb, total_kb.saturating_sub(available_kb))
        .context("MemTotal is zero")?;

    info!(
        percent = usage.percent,
        used_kb = usage.kb,
        "Memory usage calculated"
    );
    Ok(usage)
}

/// Value in kB of a `Key:   1234 kB` line.
fn field_kb(meminfo: &str, key: &str) -> Result<u64> {
    meminfo
        .lines()
        .find_map(|line| {
            let (name, rest) = line.split_once(':')?;
            (name.trim() == key).then_some(rest)
        })
        .with_context(|| format!("{key} not found in meminfo"))?
        .split_whitespace()
        .next()
        .with_context(|| format!("{key} has no value"))?
        .parse()
        .with_context(|| format!("{key} is not a number"))
}
