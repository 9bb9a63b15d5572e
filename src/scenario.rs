//! The regression sequence and the per-iteration lifecycle.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use reqwest::Client;
use tracing::error;

use crate::config::{HarnessConfig, RunDescriptor};
use crate::container;
use crate::health;
use crate::query;
use crate::telemetry::TracePipeline;

/// Creates the timestamped directory holding every run's log file and the
/// shared `qwdata` volume, and returns its absolute path.
pub fn create_run_dir() -> Result<PathBuf> {
    let name = Local::now().format("%Y-%m-%d--%H-%M-%S").to_string();
    let dir = env::current_dir()
        .context("failed to resolve the current directory")?
        .join(name);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create run directory {}", dir.display()))?;
    Ok(dir)
}

/// Drives the launch → readiness → ingest → query → shutdown lifecycle.
///
/// The container handle never outlives one iteration; the trace pipeline and
/// the HTTP client are built once and reused across all of them.
pub struct Harness {
    cfg: HarnessConfig,
    client: Client,
    pipeline: TracePipeline,
    run_dir: PathBuf,
}

impl Harness {
    pub fn new(cfg: HarnessConfig, pipeline: TracePipeline, run_dir: PathBuf) -> Self {
        Harness {
            cfg,
            client: Client::new(),
            pipeline,
            run_dir,
        }
    }

    /// Runs the fixed old → new → old sequence, then flushes the pipeline.
    ///
    /// A failed iteration aborts the remaining sequence; its container has
    /// already been shut down by the time the error surfaces here.
    pub async fn run_sequence(self) -> Result<()> {
        let mut outcome = Ok(());
        for run in self.cfg.runs() {
            outcome = self.run_once(&run).await;
            if outcome.is_err() {
                break;
            }
        }
        self.pipeline.shutdown();
        outcome
    }

    /// One iteration of the lifecycle.
    ///
    /// Shutdown runs exactly once per started container, whether the ingest
    /// and query work succeeded or not. The readiness gate is the exception:
    /// exhausting it ends the whole process with exit code 2, skipping every
    /// cleanup path, and the container is left behind.
    pub async fn run_once(&self, run: &RunDescriptor) -> Result<()> {
        let container = container::launch(&self.cfg, &self.run_dir, &run.image, run.log_file)?;
        self.gate_on_readiness().await;
        let outcome = self.ingest_and_list(run.label).await;
        container.shutdown(self.cfg.shutdown_timeout).await;
        outcome
    }

    async fn gate_on_readiness(&self) {
        let ready = health::wait_until_ready(
            &self.client,
            &self.cfg.rest_url(),
            self.cfg.readiness_attempts,
            self.cfg.probe_interval,
            self.cfg.settle_delay,
        )
        .await;
        if let Err(err) = ready {
            error!(%err, "quickwit never started, exiting");
            std::process::exit(health::EXHAUSTED_EXIT_CODE);
        }
    }

    async fn ingest_and_list(&self, label: &str) -> Result<()> {
        self.pipeline
            .emit_span(label, self.cfg.indexing_delay)
            .await?;
        query::list_traces(&self.client, &self.cfg.rest_url(), &self.cfg.index_id).await?;
        Ok(())
    }
}
