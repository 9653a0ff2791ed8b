pub mod cpu;
pub mod disk;
pub mod load;
pub mod memory;
pub mod network;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::identity::DeviceIdResolver;

/// Host filesystem locations the probes read from.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub proc_root: PathBuf,
    pub net_class_root: PathBuf,
    pub disk_path: PathBuf,
}

/// One point-in-time sample of a device, as sent to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub device_id: String,
    pub system_metrics: SystemMetrics,
    pub network_metrics: NetworkMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub uptime: f64,
    pub cpu_usage: f64,
    pub memory_percent: f64,
    pub memory_kb: u64,
    pub disk_percent: f64,
    pub disk_kb: u64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub interface: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

/// Builds a [`Snapshot`] per cycle from the individual probes.
#[derive(Debug)]
pub struct Collector {
    paths: HostPaths,
    resolver: DeviceIdResolver,
    cpu_sample_gap: Duration,
}

impl Collector {
    /// Collector using the default CPU sampling gap.
    pub fn new(paths: HostPaths, resolver: DeviceIdResolver) -> Self {
        Self {
            paths,
            resolver,
            cpu_sample_gap: cpu::SAMPLE_GAP,
        }
    }

    /// Override the pause between the two `/proc/stat` samples.
    pub fn with_cpu_sample_gap(mut self, gap: Duration) -> Self {
        self.cpu_sample_gap = gap;
        self
    }

    /// Collect every metric into a snapshot.
    ///
    /// Probe failures become sentinels; only identity resolution can fail.
    pub async fn collect(&mut self) -> Result<Snapshot> {
        info!("Starting metrics collection");

        let device_id = self.resolver.resolve()?;
        let uptime = load::uptime(&self.paths);
        let cpu_usage = cpu::usage(&self.paths, self.cpu_sample_gap).await;
        let memory = memory::usage(&self.paths);
        let disk = disk::usage(&self.paths.disk_path);
        let load = load::average(&self.paths);

        let system_metrics = SystemMetrics {
            uptime,
            cpu_usage,
            memory_percent: memory.percent,
            memory_kb: memory.kb,
            disk_percent: disk.percent,
            disk_kb: disk.kb,
            load_1: load.one,
            load_5: load.five,
            load_15: load.fifteen,
        };

        let network_metrics = match network::default_interface(&self.paths) {
            Some(interface) => {
                info!(interface = %interface, "Collecting network stats");
                let counters = network::counters(&self.paths, &interface);
                NetworkMetrics {
                    ip_address: network::ip_address(&interface),
                    mac_address: network::mac_address(&self.paths, &interface),
                    rx_bytes: counters.rx_bytes,
                    tx_bytes: counters.tx_bytes,
                    rx_packets: counters.rx_packets,
                    tx_packets: counters.tx_packets,
                    interface: Some(interface),
                }
            }
            None => {
                warn!("No default network interface found; skipping network stats");
                NetworkMetrics::default()
            }
        };

        let snapshot = Snapshot {
            device_id,
            system_metrics,
            network_metrics,
        };
        info!("Metrics collection complete");
        debug!(snapshot = ?snapshot, "Collected metrics");
        Ok(snapshot)
    }
}

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Used-space report in several units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageInfo {
    pub percent: f64,
    pub kb: u64,
    pub mb: f64,
    pub gb: f64,
}

impl UsageInfo {
    /// Build a report from total and used kilobytes. A zero total is an error.
    pub fn from_kb(total_kb: u64, used_kb: u64) -> Result<Self> {
        if total_kb == 0 {
            anyhow::bail!("total size is zero");
        }
        Ok(Self {
            percent: round2(used_kb as f64 / total_kb as f64 * 100.0),
            kb: used_kb,
            mb: round2(used_kb as f64 / 1024.0),
            gb: round2(used_kb as f64 / (1024.0 * 1024.0)),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeHost;
    use super::*;

    const ROUTE: &str = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
eth9\t00000000\t0102A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0\n";

    fn resolver(host: &FakeHost) -> DeviceIdResolver {
        DeviceIdResolver::new(
            Some("test-device".to_string()),
            host.dir.path().join("machine-id"),
            host.dir.path().join("id.txt"),
        )
    }

    #[test]
    fn test_usage_info_units() {
        let usage = UsageInfo::from_kb(4 * 1024 * 1024, 1024 * 1024).unwrap();
        assert_eq!(usage.percent, 25.0);
        assert_eq!(usage.kb, 1_048_576);
        assert_eq!(usage.mb, 1024.0);
        assert_eq!(usage.gb, 1.0);
    }

    #[test]
    fn test_usage_info_zero_total_is_error() {
        assert!(UsageInfo::from_kb(0, 0).is_err());
    }

    #[tokio::test]
    async fn test_collect_with_empty_host_uses_sentinels() {
        let host = FakeHost::new();
        let mut collector =
            Collector::new(host.paths(), resolver(&host)).with_cpu_sample_gap(Duration::ZERO);

        let snapshot = collector.collect().await.unwrap();
        assert_eq!(snapshot.device_id, "test-device");
        assert_eq!(snapshot.system_metrics.uptime, -1.0);
        assert_eq!(snapshot.system_metrics.cpu_usage, 0.0);
        assert_eq!(snapshot.system_metrics.memory_percent, 0.0);
        assert_eq!(snapshot.system_metrics.memory_kb, 0);
        assert_eq!(snapshot.system_metrics.load_1, -1.0);
        assert_eq!(snapshot.system_metrics.load_5, -1.0);
        assert_eq!(snapshot.system_metrics.load_15, -1.0);
        assert_eq!(snapshot.network_metrics, NetworkMetrics::default());
    }

    #[tokio::test]
    async fn test_collect_reads_fake_host() {
        let host = FakeHost::new();
        host.write_proc("uptime", "350735.47 234388.90\n");
        host.write_proc("stat", "cpu  100 0 100 800 0 0 0 0 0 0\n");
        host.write_proc(
            "meminfo",
            "MemTotal:        8000000 kB\nMemFree:         1000000 kB\nMemAvailable:    6000000 kB\n",
        );
        host.write_proc("loadavg", "0.52 0.58 0.59 1/467 28711\n");
        host.write_proc("net/route", ROUTE);
        host.write_net("eth9/address", "02:42:ac:11:00:02\n");
        host.write_net("eth9/statistics/rx_bytes", "1000\n");
        host.write_net("eth9/statistics/tx_bytes", "2000\n");
        host.write_net("eth9/statistics/rx_packets", "10\n");
        host.write_net("eth9/statistics/tx_packets", "20\n");

        let mut collector =
            Collector::new(host.paths(), resolver(&host)).with_cpu_sample_gap(Duration::ZERO);
        let snapshot = collector.collect().await.unwrap();

        let sys = &snapshot.system_metrics;
        assert_eq!(sys.uptime, 350735.47);
        assert_eq!(sys.cpu_usage, 0.0);
        assert_eq!(sys.memory_percent, 25.0);
        assert_eq!(sys.memory_kb, 2_000_000);
        assert_eq!((sys.load_1, sys.load_5, sys.load_15), (0.52, 0.58, 0.59));

        let net = &snapshot.network_metrics;
        assert_eq!(net.interface.as_deref(), Some("eth9"));
        assert_eq!(net.mac_address.as_deref(), Some("02:42:ac:11:00:02"));
        // eth9 does not exist on the real host.
        assert_eq!(net.ip_address, None);
        assert_eq!(
            (net.rx_bytes, net.tx_bytes, net.rx_packets, net.tx_packets),
            (1000, 2000, 10, 20)
        );
    }

    #[test]
    fn test_snapshot_json_shape_and_round_trip() {
        let snapshot = Snapshot {
            device_id: "abc".to_string(),
            system_metrics: SystemMetrics {
                uptime: 12.5,
                cpu_usage: 33.33,
                memory_percent: 41.27,
                memory_kb: 3_300_000,
                disk_percent: 70.01,
                disk_kb: 90_000_000,
                load_1: 0.1,
                load_5: 0.2,
                load_15: 0.3,
            },
            network_metrics: NetworkMetrics {
                interface: Some("eth0".to_string()),
                ip_address: Some("10.0.0.5".to_string()),
                mac_address: None,
                rx_bytes: u64::MAX,
                tx_bytes: 1,
                rx_packets: 2,
                tx_packets: 3,
            },
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["system_metrics"]["cpu_usage"], 33.33);
        assert_eq!(json["network_metrics"]["interface"], "eth0");
        assert!(json["network_metrics"]["mac_address"].is_null());

        let parsed: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
