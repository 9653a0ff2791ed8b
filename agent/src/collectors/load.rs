use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use super::HostPaths;
use crate::aspects::or_default;

/// 1, 5 and 15 minute load averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

impl LoadAverage {
    pub const UNAVAILABLE: Self = Self {
        one: -1.0,
        five: -1.0,
        fifteen: -1.0,
    };
}

/// Seconds since boot, or `-1.0` on failure.
pub fn uptime(paths: &HostPaths) -> f64 {
    or_default("uptime", || read_uptime(paths), || -1.0)
}

/// Load averages, or all `-1.0` on failure.
pub fn average(paths: &HostPaths) -> LoadAverage {
    or_default(
        "load_average",
        || read_load_average(paths),
        || LoadAverage::UNAVAILABLE,
    )
}

fn read_uptime(paths: &HostPaths) -> Result<f64> {
    let path = paths.proc_root.join("uptime");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let uptime: f64 = contents
        .split_whitespace()
        .next()
        .context("uptime file is empty")?
        .parse()
        .context("uptime is not a number")?;

    info!(uptime, "System uptime retrieved");
    Ok(uptime)
}

fn read_load_average(paths: &HostPaths) -> Result<LoadAverage> {
    let path = paths.proc_root.join("loadavg");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let values = contents
        .split_whitespace()
        .take(3)
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .context("malformed loadavg")?;

    let [one, five, fifteen] = values[..] else {
        anyhow::bail!("loadavg has fewer than three values");
    };

    let load = LoadAverage { one, five, fifteen };
    info!(one, five, fifteen, "Load averages retrieved");
    Ok(load)
}
