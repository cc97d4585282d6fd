use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::metrics;

/// Pre-attempt connection check. Downloads a fixed reference resource,
/// times the transfer, and fails closed: any probe error reports Slow.
pub struct ReadinessService {
    http: Client,
    probe_url: String,
    timeout: Duration,
    min_speed_mbps: f64,
}

#[derive(Debug, Clone)]
pub struct ReadinessReport {
    pub speed_mbps: Option<f64>,
    pub status: ReadinessStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStatus {
    Ok,
    Slow,
}

/// Arms when the instructions screen is shown and releases the start
/// action only after the mandatory reading delay has passed with a
/// passing readiness report in hand.
pub struct EntryGate {
    armed_at: Instant,
    reading_delay: Duration,
}

impl ReadinessStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ReadinessStatus::Ok)
    }
}

impl ReadinessService {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            probe_url: config.speed_probe_url.clone(),
            timeout: Duration::from_secs(config.speed_probe_timeout_secs),
            min_speed_mbps: config.min_speed_mbps,
        }
    }

    pub async fn check_readiness(&self) -> ReadinessReport {
        match tokio::time::timeout(self.timeout, self.measure_speed()).await {
            Ok(Ok(speed_mbps)) => {
                let status = if speed_mbps >= self.min_speed_mbps {
                    ReadinessStatus::Ok
                } else {
                    ReadinessStatus::Slow
                };
                let label = if status.is_ok() { "ok" } else { "slow" };
                metrics::READINESS_CHECKS_TOTAL
                    .with_label_values(&[label])
                    .inc();
                tracing::info!(
                    "Speed check measured {:.2} Mbps (minimum {:.2})",
                    speed_mbps,
                    self.min_speed_mbps
                );
                ReadinessReport {
                    speed_mbps: Some(speed_mbps),
                    status,
                }
            }
            Ok(Err(e)) => {
                metrics::READINESS_CHECKS_TOTAL
                    .with_label_values(&["slow"])
                    .inc();
                tracing::warn!("Speed probe failed: {:#}", e);
                ReadinessReport {
                    speed_mbps: None,
                    status: ReadinessStatus::Slow,
                }
            }
            Err(_) => {
                metrics::READINESS_CHECKS_TOTAL
                    .with_label_values(&["slow"])
                    .inc();
                tracing::warn!("Speed probe timed out after {:?}", self.timeout);
                ReadinessReport {
                    speed_mbps: None,
                    status: ReadinessStatus::Slow,
                }
            }
        }
    }

    async fn measure_speed(&self) -> Result<f64> {
        // Cache-busting query keeps intermediaries from serving the
        // probe out of cache and faking the measurement
        let url = format!("{}?t={}", self.probe_url, Utc::now().timestamp_millis());
        let started = Instant::now();

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to reach speed probe")?;

        if !response.status().is_success() {
            bail!("Speed probe returned {}", response.status());
        }

        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed while reading speed probe body")?;
            bytes += chunk.len() as u64;
        }

        if bytes == 0 {
            bail!("Speed probe returned an empty body");
        }

        let elapsed = started.elapsed().max(Duration::from_millis(1));
        Ok((bytes * 8) as f64 / 1_000_000.0 / elapsed.as_secs_f64())
    }
}

impl EntryGate {
    pub fn new(reading_delay: Duration) -> Self {
        Self {
            armed_at: Instant::now(),
            reading_delay,
        }
    }

    pub fn delay_remaining(&self) -> Duration {
        self.reading_delay.saturating_sub(self.armed_at.elapsed())
    }

    pub fn delay_elapsed(&self) -> bool {
        self.delay_remaining().is_zero()
    }

    pub fn can_start(&self, report: Option<&ReadinessReport>) -> bool {
        self.delay_elapsed() && report.map(|r| r.status.is_ok()).unwrap_or(false)
    }
}
