//! Reading ingested traces back through the Jaeger-compatible query API.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::info;

/// Fetches whatever the server has indexed for `index_id` and prints the
/// status code and the decoded body.
///
/// Purely observational: any status code is accepted and reported, nothing
/// is asserted about the content. A body that fails to decode as JSON is a
/// propagating fault, matching the treatment of every other unexpected
/// condition past the health gate. The printed pair is also returned so
/// tests can inspect it.
pub async fn list_traces(
    client: &Client,
    base_url: &str,
    index_id: &str,
) -> Result<(StatusCode, Value)> {
    info!(index_id, "listing traces");
    let url = format!("{base_url}/api/v1/{index_id}/jaeger/api/traces");
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("trace query against {url} failed"))?;
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .context("trace query returned a non-JSON body")?;
    println!("{}", status.as_u16());
    println!("{body:#}");
    Ok((status, body))
}
