//! One full iteration of the lifecycle against mocked collaborators: a fake
//! container engine, a mock Quickwit REST endpoint serving both the
//! readiness probe and the Jaeger query path, and a mock OTLP collector.

#![cfg(unix)]

use std::convert::Infallible;
use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_server::{TraceService, TraceServiceServer},
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use qw_regression::config::{HarnessConfig, RunDescriptor};
use qw_regression::scenario::Harness;
use qw_regression::telemetry::TracePipeline;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::TcpListenerStream;

fn fake_engine(dir: &Path) -> (PathBuf, PathBuf) {
    let invocations = dir.join("invocations.log");
    let engine = dir.join("fake-docker");
    let script = format!(
        "#!/bin/sh\n\
         echo \"$@\" >> \"{log}\"\n\
         if [ \"$1\" = run ]; then\n\
             trap 'exit 0' TERM\n\
             while true; do sleep 0.05; done\n\
         fi\n",
        log = invocations.display(),
    );
    fs::write(&engine, script).unwrap();
    fs::set_permissions(&engine, fs::Permissions::from_mode(0o755)).unwrap();
    (engine, invocations)
}

/// Mock Quickwit REST API: always-ready health probe, canned trace query
/// response.
async fn spawn_rest_server(query_body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| async move {
                    let body = match req.uri().path() {
                        "/health/readyz" => "true",
                        path if path.ends_with("/jaeger/api/traces") => query_body,
                        _ => {
                            let mut resp = Response::new(Full::new(Bytes::new()));
                            *resp.status_mut() = StatusCode::NOT_FOUND;
                            return Ok::<_, Infallible>(resp);
                        }
                    };
                    Ok(Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
                });
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}

struct MockCollector {
    tx: Mutex<mpsc::Sender<ExportTraceServiceRequest>>,
}

#[tonic::async_trait]
impl TraceService for MockCollector {
    async fn export(
        &self,
        request: tonic::Request<ExportTraceServiceRequest>,
    ) -> Result<tonic::Response<ExportTraceServiceResponse>, tonic::Status> {
        self.tx
            .lock()
            .unwrap()
            .try_send(request.into_inner())
            .expect("channel full");
        Ok(tonic::Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

async fn spawn_collector() -> (SocketAddr, mpsc::Receiver<ExportTraceServiceRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(10);
    let service = TraceServiceServer::new(MockCollector { tx: Mutex::new(tx) });
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("mock collector failed")
    });
    (addr, rx)
}

fn test_config(engine: &Path, rest_port: u16, otlp_port: u16) -> HarnessConfig {
    HarnessConfig {
        engine: engine.display().to_string(),
        rest_port,
        otlp_port,
        probe_interval: Duration::from_millis(10),
        settle_delay: Duration::ZERO,
        indexing_delay: Duration::ZERO,
        shutdown_timeout: Duration::from_secs(5),
        ..HarnessConfig::default()
    }
}

fn removals(invocations: &Path) -> usize {
    fs::read_to_string(invocations)
        .unwrap_or_default()
        .lines()
        .filter(|line| line.starts_with("rm -f qwregression"))
        .count()
}

#[tokio::test(flavor = "multi_thread")]
async fn an_iteration_runs_launch_ready_ingest_query_shutdown() {
    let run_dir = tempfile::tempdir().unwrap();
    let (engine, invocations) = fake_engine(run_dir.path());
    let rest_addr = spawn_rest_server(r#"{"data": []}"#).await;
    let (otlp_addr, mut req_rx) = spawn_collector().await;

    let cfg = test_config(&engine, rest_addr.port(), otlp_addr.port());
    let pipeline = TracePipeline::new(&cfg.otlp_endpoint()).unwrap();
    let harness = Harness::new(cfg, pipeline, run_dir.path().to_path_buf());

    let run = RunDescriptor {
        image: "quickwit/quickwit:test".to_string(),
        log_file: "a.log",
        label: "oldrun1",
    };
    harness.run_once(&run).await.unwrap();

    // The ingested span made it to the collector under the run's label.
    let req = req_rx.recv().await.expect("missing export request");
    let span_names: Vec<_> = req
        .resource_spans
        .iter()
        .flat_map(|rs| &rs.scope_spans)
        .flat_map(|ss| &ss.spans)
        .map(|span| span.name.as_str())
        .collect();
    assert_eq!(span_names, ["oldrun1"]);

    // The engine saw one launch and exactly one forced removal.
    let calls = fs::read_to_string(&invocations).unwrap();
    assert!(calls
        .lines()
        .any(|line| line.starts_with("run --name qwregression")));
    assert_eq!(removals(&invocations), 1);
    assert!(run_dir.path().join("a.log").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_runs_even_when_the_query_fails() {
    let run_dir = tempfile::tempdir().unwrap();
    let (engine, invocations) = fake_engine(run_dir.path());
    // A body the lister cannot decode as JSON turns the query into a fault.
    let rest_addr = spawn_rest_server("definitely not json").await;
    let (otlp_addr, _req_rx) = spawn_collector().await;

    let cfg = test_config(&engine, rest_addr.port(), otlp_addr.port());
    let pipeline = TracePipeline::new(&cfg.otlp_endpoint()).unwrap();
    let harness = Harness::new(cfg, pipeline, run_dir.path().to_path_buf());

    let run = RunDescriptor {
        image: "quickwit/quickwit:test".to_string(),
        log_file: "a.log",
        label: "oldrun1",
    };
    let outcome = harness.run_once(&run).await;

    assert!(outcome.is_err());
    assert_eq!(removals(&invocations), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_runs_even_when_the_ingest_fails() {
    let run_dir = tempfile::tempdir().unwrap();
    let (engine, invocations) = fake_engine(run_dir.path());
    let rest_addr = spawn_rest_server(r#"{"data": []}"#).await;
    // No collector behind the OTLP port: the forced flush cannot deliver.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let otlp_port = dead.local_addr().unwrap().port();
    drop(dead);

    let cfg = test_config(&engine, rest_addr.port(), otlp_port);
    let pipeline = TracePipeline::new(&cfg.otlp_endpoint()).unwrap();
    let harness = Harness::new(cfg, pipeline, run_dir.path().to_path_buf());

    let run = RunDescriptor {
        image: "quickwit/quickwit:test".to_string(),
        log_file: "a.log",
        label: "oldrun1",
    };
    let outcome = harness.run_once(&run).await;

    assert!(outcome.is_err());
    assert_eq!(removals(&invocations), 1);
}
