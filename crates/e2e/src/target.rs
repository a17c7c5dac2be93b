//! Reachability of the application under test
//!
//! The app is an external deployment, so nothing is spawned here. Before a
//! run we only make sure it answers, which separates "the demo is down or
//! we are offline" from genuine test failures.

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::todomvc::DEFAULT_BASE_URL;

/// Configuration for probing the target application
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub base_url: String,

    /// Give up after this long
    pub probe_timeout: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Pause between attempts
    pub retry_interval: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            probe_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(500),
        }
    }
}

/// Wait until the base URL answers with a success status
pub async fn wait_until_reachable(config: &TargetConfig) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(&config.base_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Target is reachable at {}", config.base_url);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Target probe returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to respond...", config.base_url);
                }
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Target probe error: {}", e);
                }
            }
        }

        if start.elapsed() + config.retry_interval >= config.probe_timeout {
            break;
        }
        sleep(config.retry_interval).await;
    }

    Err(E2eError::TargetUnreachable {
        url: config.base_url.clone(),
        attempts,
    })
}
