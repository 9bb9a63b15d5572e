use anyhow::Result;
use qw_regression::config::HarnessConfig;
use qw_regression::scenario::{self, Harness};
use qw_regression::telemetry::TracePipeline;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = HarnessConfig::from_env();
    let run_dir = scenario::create_run_dir()?;
    let pipeline = TracePipeline::new(&cfg.otlp_endpoint())?;
    Harness::new(cfg, pipeline, run_dir).run_sequence().await
}
