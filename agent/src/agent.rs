use anyhow::{Context, Result};
use tracing::info;

use crate::aspects::timed;
use crate::collectors::Collector;
use crate::config::AgentConfig;
use crate::delivery::{Deliverer, Receipt};
use crate::identity::DeviceIdResolver;

/// Collect-then-deliver driver.
#[derive(Debug)]
pub struct Agent {
    collector: Collector,
    deliverer: Deliverer,
    containerized: bool,
}

impl Agent {
    /// Wire an agent from already built parts.
    pub fn new(collector: Collector, deliverer: Deliverer, containerized: bool) -> Self {
        Self {
            collector,
            deliverer,
            containerized,
        }
    }

    /// Build the collector and deliverer described by `config`.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let resolver = DeviceIdResolver::new(
            config.device_id.clone(),
            &config.machine_id_path,
            &config.device_id_file,
        );
        let collector = Collector::new(config.host_paths(), resolver);
        let deliverer = Deliverer::new(config.endpoint(), &config.delivery()?)?;
        Ok(Self::new(collector, deliverer, config.containerized))
    }

    /// One collect + deliver cycle.
    pub async fn run_cycle(&mut self) -> Result<Receipt> {
        let snapshot = timed("collect", self.collector.collect())
            .await
            .context("metrics collection failed")?;
        let receipt = timed("deliver", self.deliverer.deliver(&snapshot)).await?;
        Ok(receipt)
    }

    /// Run once, or forever when containerized. Pacing between cycles comes
    /// from the delivery rate limiter. Returns on the first terminal error.
    pub async fn run(mut self) -> Result<()> {
        info!(
            containerized = self.containerized,
            endpoint = %self.deliverer.endpoint(),
            "Starting collection"
        );

        if !self.containerized {
            self.run_cycle().await?;
            return Ok(());
        }

        loop {
            self.run_cycle().await?;
        }
    }
}
