//! Harness configuration and the fixed regression sequence.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Last image known to behave, the baseline for both compatibility
/// directions.
pub const DEFAULT_OLD_IMAGE: &str = "quickwit/quickwit:qw-matterlabs-20240709-2";
/// Image under test.
pub const DEFAULT_NEW_IMAGE: &str = "quickwit/quickwit:edge";

/// One container launch within the regression sequence.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    /// Image reference handed to the container engine.
    pub image: String,
    /// Log file name for the container's stdout, relative to the run
    /// directory.
    pub log_file: &'static str,
    /// Operation name of the span ingested during this run, which makes the
    /// originating run recognizable in the queried output.
    pub label: &'static str,
}

/// Every knob of the harness in one place, threaded through explicitly.
///
/// [`Default`] holds the values the regression sequence has always used.
/// The `QW_REGRESSION_*` environment variables override the ones that vary
/// between setups, see [`HarnessConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub old_image: String,
    pub new_image: String,
    /// Fixed container name, shared by all three runs. At most one live
    /// container at a time; a leftover container under this name makes the
    /// next launch fail.
    pub container_name: String,
    /// Container engine binary. Tests substitute a fake.
    pub engine: String,
    /// Host port mapped to the server's REST API.
    pub rest_port: u16,
    /// Host port mapped to the server's OTLP/gRPC ingestion endpoint.
    pub otlp_port: u16,
    /// Index holding the ingested spans.
    pub index_id: String,
    /// Readiness probe budget before giving up on a launch.
    pub readiness_attempts: u32,
    pub probe_interval: Duration,
    /// Slept after a successful readiness probe; the ingest pipeline lags
    /// the health signal.
    pub settle_delay: Duration,
    /// Slept after flushing a span, to let server-side indexing finish
    /// before the read query. Assumed, not observed.
    pub indexing_delay: Duration,
    /// How long a container gets to exit after SIGTERM before removal is
    /// forced.
    pub shutdown_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            old_image: DEFAULT_OLD_IMAGE.to_string(),
            new_image: DEFAULT_NEW_IMAGE.to_string(),
            container_name: "qwregression".to_string(),
            engine: "docker".to_string(),
            rest_port: 7280,
            otlp_port: 7281,
            index_id: "otel-traces-v0_7".to_string(),
            readiness_attempts: 100,
            probe_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(6),
            indexing_delay: Duration::from_secs(20),
            shutdown_timeout: Duration::from_secs(15),
        }
    }
}

impl HarnessConfig {
    /// Default configuration with `QW_REGRESSION_{OLD_IMAGE,NEW_IMAGE,
    /// ENGINE,INDEX_WAIT_SECS}` overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = HarnessConfig::default();
        if let Ok(image) = env::var("QW_REGRESSION_OLD_IMAGE") {
            cfg.old_image = image;
        }
        if let Ok(image) = env::var("QW_REGRESSION_NEW_IMAGE") {
            cfg.new_image = image;
        }
        if let Ok(engine) = env::var("QW_REGRESSION_ENGINE") {
            cfg.engine = engine;
        }
        if let Ok(secs) = env::var("QW_REGRESSION_INDEX_WAIT_SECS") {
            match secs.parse() {
                Ok(secs) => cfg.indexing_delay = Duration::from_secs(secs),
                Err(_) => warn!(
                    value = %secs,
                    "ignoring unparsable QW_REGRESSION_INDEX_WAIT_SECS"
                ),
            }
        }
        cfg
    }

    /// Base URL of the server's REST API on the host.
    pub fn rest_url(&self) -> String {
        format!("http://localhost:{}", self.rest_port)
    }

    /// OTLP/gRPC endpoint the span exporter pushes to.
    pub fn otlp_endpoint(&self) -> String {
        format!("http://localhost:{}", self.otlp_port)
    }

    /// The fixed old -> new -> old sequence. The second old run reads an
    /// index the new image has written into.
    pub fn runs(&self) -> [RunDescriptor; 3] {
        [
            RunDescriptor {
                image: self.old_image.clone(),
                log_file: "old_image_run_1.log",
                label: "oldrun1",
            },
            RunDescriptor {
                image: self.new_image.clone(),
                log_file: "new_image_run.log",
                label: "newrun1",
            },
            RunDescriptor {
                image: self.old_image.clone(),
                log_file: "old_image_run_2.log",
                label: "oldrun2",
            },
        ]
    }
}
