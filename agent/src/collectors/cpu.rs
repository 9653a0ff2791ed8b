use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{round2, HostPaths};

/// Gap between the two `/proc/stat` samples.
pub const SAMPLE_GAP: Duration = Duration::from_millis(100);

/// Aggregate CPU time counters from the first `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Read the aggregate `cpu` line of `/proc/stat`.
pub fn read_times(paths: &HostPaths) -> Result<CpuTimes> {
    let path = paths.proc_root.join("stat");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_times(&contents)
}

fn parse_times(contents: &str) -> Result<CpuTimes> {
    let line = contents
        .lines()
        .next()
        .filter(|l| l.starts_with("cpu"))
        .context("missing aggregate cpu line")?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .context("malformed cpu counters")?;

    let idle = *fields.get(3).context("cpu line has no idle counter")?;
    Ok(CpuTimes {
        idle,
        total: fields.iter().sum(),
    })
}

/// Utilisation between two samples, in percent.
pub fn usage_between(first: CpuTimes, second: CpuTimes) -> f64 {
    let idle_delta = second.idle.saturating_sub(first.idle);
    let total_delta = second.total.saturating_sub(first.total);

    if total_delta == 0 {
        warn!("CPU total delta is zero, returning 0.0 usage");
        return 0.0;
    }

    let usage = 100.0 * (1.0 - idle_delta as f64 / total_delta as f64);
    round2(usage.clamp(0.0, 100.0))
}

/// Sample CPU counters `gap` apart and return usage, or `0.0` on failure.
pub async fn usage(paths: &HostPaths, gap: Duration) -> f64 {
    let first = match read_times(paths) {
        Ok(t) => t,
        Err(e) => {
            warn!("Failed to calculate CPU usage: {e:#}");
            return 0.0;
        }
    };

    tokio::time::sleep(gap).await;

    match read_times(paths) {
        Ok(second) => {
            let usage = usage_between(first, second);
            info!(cpu_usage = usage, "CPU usage calculated");
            usage
        }
        Err(e) => {
            warn!("Failed to calculate CPU usage: {e:#}");
            0.0
        }
    }
}
