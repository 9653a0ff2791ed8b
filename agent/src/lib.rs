//! Hostwatch agent: collects host telemetry and upserts it to a collector.

pub mod agent;
pub mod aspects;
pub mod collectors;
pub mod config;
pub mod delivery;
pub mod identity;
