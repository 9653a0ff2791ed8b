use std::fs;
use std::net::IpAddr;

use anyhow::{Context, Result};
use sysinfo::Networks;
use tracing::{info, warn};

use super::HostPaths;
use crate::aspects::{or_default, traced};

/// Cumulative counters of one interface. Unreadable counters are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

/// Interface carrying the default route, from `/proc/net/route`.
pub fn default_interface(paths: &HostPaths) -> Option<String> {
    or_default(
        "default_interface",
        || read_default_interface(paths),
        || None,
    )
}

fn read_default_interface(paths: &HostPaths) -> Result<Option<String>> {
    let path = paths.proc_root.join("net/route");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let interface = contents.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        (fields.next()? == "00000000").then(|| iface.to_string())
    });

    if let Some(name) = &interface {
        info!(interface = %name, "Default network interface detected");
    }
    Ok(interface)
}

/// Hardware address of `interface`.
pub fn mac_address(paths: &HostPaths, interface: &str) -> Option<String> {
    or_default(
        "mac_address",
        || {
            let path = paths.net_class_root.join(interface).join("address");
            let mac = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .trim()
                .to_string();
            if mac.is_empty() {
                return Ok(None);
            }
            info!(interface, mac = %mac, "MAC address retrieved");
            Ok(Some(mac))
        },
        || None,
    )
}

/// First IPv4 address assigned to `interface`.
pub fn ip_address(interface: &str) -> Option<String> {
    traced("ip_address", interface, || {
        or_default(
            "ip_address",
            || {
                let networks = Networks::new_with_refreshed_list();
                let data = networks
                    .list()
                    .get(interface)
                    .with_context(|| format!("interface {interface} not found"))?;
                let addrs: Vec<IpAddr> = data.ip_networks().iter().map(|n| n.addr).collect();
                Ok(first_ipv4(interface, &addrs))
            },
            || None,
        )
    })
}

fn first_ipv4(interface: &str, addrs: &[IpAddr]) -> Option<String> {
    match addrs.iter().find(|a| a.is_ipv4()) {
        Some(ip) => {
            info!(interface, ip = %ip, "IP address retrieved");
            Some(ip.to_string())
        }
        None => {
            warn!(interface, "No IPv4 address found");
            None
        }
    }
}

/// RX/TX byte and packet counters for `interface`.
///
/// Each counter is read on its own, so a missing file only zeroes that one.
pub fn counters(paths: &HostPaths, interface: &str) -> InterfaceCounters {
    let read = |name: &str| -> u64 {
        let path = paths
            .net_class_root
            .join(interface)
            .join("statistics")
            .join(name);
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| s.trim().parse::<u64>().map_err(anyhow::Error::from))
        {
            Ok(value) => value,
            Err(e) => {
                warn!(interface, counter = name, error = %e, "Failed to read network counter");
                0
            }
        }
    };

    let counters = InterfaceCounters {
        rx_bytes: read("rx_bytes"),
        tx_bytes: read("tx_bytes"),
        rx_packets: read("rx_packets"),
        tx_packets: read("tx_packets"),
    };
    info!(
        interface,
        rx_bytes = counters.rx_bytes,
        tx_bytes = counters.tx_bytes,
        rx_packets = counters.rx_packets,
        tx_packets = counters.tx_packets,
        "Network stats retrieved"
    );
    counters
}
