//! Readiness polling against the server's health endpoint.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

/// Process exit code for a launch whose server never reported ready.
pub const EXHAUSTED_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The readiness budget ran out without a single ready response.
    #[error("server never became ready after {attempts} probes")]
    Exhausted { attempts: u32 },
}

/// Polls `{base_url}/health/readyz` until the server reports ready, for at
/// most `attempts` probes spaced `probe_interval` apart.
///
/// Transport errors (connection refused, timeout) count as ordinary
/// not-ready attempts. After the first ready response an extra
/// `settle_delay` is slept before returning: readiness precedes the ingest
/// pipeline actually accepting data.
pub async fn wait_until_ready(
    client: &Client,
    base_url: &str,
    attempts: u32,
    probe_interval: Duration,
    settle_delay: Duration,
) -> Result<(), ProbeError> {
    let url = format!("{base_url}/health/readyz");
    for attempt in 1..=attempts {
        info!(attempt, "checking on quickwit");
        match probe(client, &url).await {
            Ok(true) => {
                info!(attempt, "quickwit started");
                tokio::time::sleep(settle_delay).await;
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => debug!(attempt, %err, "readiness probe failed"),
        }
        info!("server not ready yet, sleeping before retry");
        tokio::time::sleep(probe_interval).await;
    }
    Err(ProbeError::Exhausted { attempts })
}

async fn probe(client: &Client, url: &str) -> Result<bool, reqwest::Error> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    Ok(is_ready(status, &body))
}

/// Ready means status 200 and a body that trims to exactly `true`.
fn is_ready(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK && body.trim() == "true"
}
