//! Upstream producer health probe.
//!
//! Advisory check against the signal producer's health endpoint, with the
//! configured timeout. A down producer never fails a request here; the
//! status is surfaced through the pipeline monitor endpoints.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamStatus {
    pub url: String,
    pub reachable: bool,
    pub status_code: Option<u16>,
    pub latency_ms: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

/// Probes the upstream producer's /health endpoint
#[derive(Clone)]
pub struct UpstreamMonitor {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamMonitor {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.upstream_url.clone(),
        }
    }

    pub async fn check(&self) -> UpstreamStatus {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        let started = Instant::now();

        match self.client.get(&url).send().await {
            Ok(response) => UpstreamStatus {
                url,
                reachable: response.status().is_success(),
                status_code: Some(response.status().as_u16()),
                latency_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
                checked_at: Utc::now(),
            },
            Err(err) => {
                warn!(url = %url, error = %err, "upstream health check failed");
                UpstreamStatus {
                    url,
                    reachable: false,
                    status_code: None,
                    latency_ms: None,
                    checked_at: Utc::now(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_upstream_reports_down() {
        let mut config = Config::default();
        config.upstream_url = "http://127.0.0.1:1".to_string();
        config.upstream_timeout_secs = 1;

        let status = UpstreamMonitor::new(&config).check().await;
        assert!(!status.reachable);
        assert!(status.status_code.is_none());
    }
}
