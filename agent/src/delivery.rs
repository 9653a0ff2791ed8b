//! Snapshot delivery to the collector.
//!
//! Each attempt PATCHes the device record and falls back to POST when the
//! collector answers 404. The whole attempt is rate limited and retried:
//! `retrying(max_retries, retry_delay, limiter.run(deliver_once))`.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, StatusCode};
use tracing::{error, info, warn};

use crate::aspects::{retrying, RateLimiter, RetryError};
use crate::collectors::Snapshot;

/// Delivery tuning knobs.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Minimum spacing between delivery attempts.
    pub interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_retries: 5,
            retry_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Successful outcome of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub status: StatusCode,
    /// The device was unknown and has been created.
    pub created: bool,
    pub body: String,
}

/// Failure of a single PATCH/POST attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{method} rejected with HTTP {status}: {body}")]
    Rejected {
        method: Method,
        status: StatusCode,
        body: String,
    },
}

/// Sends snapshots to `{collector}/api/devices/`.
///
/// Owns the rate limiter, so every delivery made through one `Deliverer`
/// shares the same pacing.
#[derive(Debug)]
pub struct Deliverer {
    http: reqwest::Client,
    endpoint: String,
    limiter: RateLimiter,
    max_retries: u32,
    retry_delay: Duration,
}

impl Deliverer {
    /// HTTP client and limiter for `endpoint`, paced by `config.interval`.
    pub fn new(endpoint: impl Into<String>, config: &DeliveryConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            limiter: RateLimiter::from_interval(config.interval),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    /// Device resource URL snapshots are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upsert `snapshot`, retrying whole PATCH/POST cycles on failure.
    pub async fn deliver(&self, snapshot: &Snapshot) -> Result<Receipt, RetryError> {
        retrying("deliver", self.max_retries, self.retry_delay, move || {
            self.limiter.run(self.deliver_once(snapshot))
        })
        .await
    }

    /// One PATCH, then a POST if the collector does not know the device.
    pub async fn deliver_once(&self, snapshot: &Snapshot) -> Result<Receipt, DeliveryError> {
        let (status, body) = self.send(Method::PATCH, snapshot).await?;

        if status == StatusCode::OK {
            info!(endpoint = %self.endpoint, "Metrics sent successfully");
            return Ok(Receipt {
                status,
                created: false,
                body,
            });
        }

        if status == StatusCode::NOT_FOUND {
            warn!(device_id = %snapshot.device_id, "Device not found, attempting to create it");
            let (status, body) = self.send(Method::POST, snapshot).await?;
            if status == StatusCode::CREATED {
                info!(device_id = %snapshot.device_id, "Device created and metrics sent");
                return Ok(Receipt {
                    status,
                    created: true,
                    body,
                });
            }
            error!(status = %status, body = %body, "Failed to create device");
            return Err(DeliveryError::Rejected {
                method: Method::POST,
                status,
                body,
            });
        }

        error!(status = %status, body = %body, "Failed to send metrics");
        Err(DeliveryError::Rejected {
            method: Method::PATCH,
            status,
            body,
        })
    }

    async fn send(
        &self,
        method: Method,
        snapshot: &Snapshot,
    ) -> Result<(StatusCode, String), DeliveryError> {
        let resp = self
            .http
            .request(method, &self.endpoint)
            .json(snapshot)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok((status, body))
    }
}
