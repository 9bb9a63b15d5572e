//! The OTLP export pipeline feeding spans into the server under test.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::{Span, Tracer, TracerProvider as _};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::info;

/// Shared span export pipeline: one OTLP/gRPC batch exporter, built once at
/// startup and reused by every run in the sequence.
pub struct TracePipeline {
    provider: SdkTracerProvider,
}

impl TracePipeline {
    /// Builds the batch pipeline exporting to `endpoint` over a plaintext
    /// gRPC channel.
    pub fn new(endpoint: &str) -> Result<Self> {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build the OTLP span exporter")?;
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(Resource::builder_empty().with_service_name("regtests").build())
            .build();
        Ok(TracePipeline { provider })
    }

    /// Emits one span named `operation_name` carrying a single `hello`
    /// event, flushes the exporter, then sleeps `indexing_delay` to give
    /// server-side indexing time to catch up.
    ///
    /// Receipt is never verified; the delay is an assumption about indexing
    /// latency, not a guarantee.
    pub async fn emit_span(&self, operation_name: &str, indexing_delay: Duration) -> Result<()> {
        info!(operation_name, "ingesting traces");
        let tracer = self.provider.tracer("qw-regression");
        let mut span = tracer.span_builder(operation_name.to_string()).start(&tracer);
        span.add_event("hello", vec![]);
        span.end();
        self.provider
            .force_flush()
            .context("failed to flush the span exporter")?;
        info!(
            delay_secs = indexing_delay.as_secs(),
            "waiting for traces to be indexed"
        );
        tokio::time::sleep(indexing_delay).await;
        Ok(())
    }

    /// Flushes and drops the exporter at the end of the whole sequence.
    pub fn shutdown(self) {
        if let Err(err) = self.provider.shutdown() {
            tracing::warn!(%err, "failed to shut down the trace pipeline");
        }
    }
}
