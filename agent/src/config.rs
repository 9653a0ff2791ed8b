use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::aspects::RateLimiter;
use crate::collectors::HostPaths;
use crate::delivery::DeliveryConfig;

/// Agent configuration: optional TOML file, then environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector base URL (e.g., "http://collector:8000").
    #[serde(default = "default_collector_url")]
    pub collector_url: String,

    /// Run forever instead of a single collect/deliver cycle.
    #[serde(default)]
    pub containerized: bool,

    /// Minimum seconds between deliveries.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Explicit device id, taking priority over every other source.
    #[serde(default)]
    pub device_id: Option<String>,

    /// Where a generated device id is persisted.
    #[serde(default = "default_device_id_file")]
    pub device_id_file: PathBuf,

    /// Host machine identity file, checked after the explicit device id.
    #[serde(default = "default_machine_id_path")]
    pub machine_id_path: PathBuf,

    /// procfs mount point.
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// Per-interface sysfs directory (`/sys/class/net`).
    #[serde(default = "default_net_class_root")]
    pub net_class_root: PathBuf,

    /// Filesystem whose usage is reported.
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,

    /// Delivery attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between failed delivery attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_collector_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_interval() -> u64 {
    1
}

fn default_device_id_file() -> PathBuf {
    PathBuf::from("/tmp/container_id.txt")
}

fn default_machine_id_path() -> PathBuf {
    PathBuf::from("/etc/machine-id")
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_net_class_root() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            collector_url: default_collector_url(),
            containerized: false,
            interval_secs: default_interval(),
            device_id: None,
            device_id_file: default_device_id_file(),
            machine_id_path: default_machine_id_path(),
            proc_root: default_proc_root(),
            net_class_root: default_net_class_root(),
            disk_path: default_disk_path(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: AgentConfig = toml::de::from_str(&contents)
            .with_context(|| format!("failed to parse config file {path}"))?;
        Ok(config)
    }

    /// Apply `CONTAINERIZED`, `INTERVAL`, `CONTAINER_ID`, `COLLECTOR_URL` and
    /// `DEVICE_ID_FILE` from `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("CONTAINERIZED") {
            self.containerized = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("INTERVAL") {
            self.interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("INTERVAL must be a whole number of seconds, got {v:?}"))?;
        }
        if let Some(v) = lookup("CONTAINER_ID").filter(|v| !v.trim().is_empty()) {
            self.device_id = Some(v);
        }
        if let Some(v) = lookup("COLLECTOR_URL").filter(|v| !v.trim().is_empty()) {
            self.collector_url = v;
        }
        if let Some(v) = lookup("DEVICE_ID_FILE").filter(|v| !v.trim().is_empty()) {
            self.device_id_file = PathBuf::from(v);
        }
        Ok(())
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs < 1 {
            anyhow::bail!("interval must be at least 1 second");
        }
        if self.max_retries < 1 {
            anyhow::bail!("max_retries must be at least 1");
        }
        if self.collector_url.trim().is_empty() {
            anyhow::bail!("collector_url must not be empty");
        }
        Ok(())
    }

    /// Device resource URL on the collector.
    pub fn endpoint(&self) -> String {
        format!("{}/api/devices/", self.collector_url.trim_end_matches('/'))
    }

    /// Host locations for the probes.
    pub fn host_paths(&self) -> HostPaths {
        HostPaths {
            proc_root: self.proc_root.clone(),
            net_class_root: self.net_class_root.clone(),
            disk_path: self.disk_path.clone(),
        }
    }

    /// Delivery rate limit: one call per `interval_secs`.
    pub fn calls_per_second(&self) -> f64 {
        1.0 / self.interval_secs as f64
    }

    /// Delivery settings, with the pacing derived from [`Self::calls_per_second`].
    pub fn delivery(&self) -> Result<DeliveryConfig> {
        let limiter = RateLimiter::new(self.calls_per_second()).context("invalid INTERVAL")?;
        Ok(DeliveryConfig {
            interval: limiter.interval(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            ..DeliveryConfig::default()
        })
    }
}
