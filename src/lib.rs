//! Black-box upgrade/compatibility regression harness for Quickwit.
//!
//! The harness starts a Quickwit container, waits for its readiness probe,
//! pushes one synthetic span over OTLP/gRPC, reads it back through the
//! Jaeger-compatible query API, and tears the container down. It does this
//! three times (old image, new image, old image again) against a shared data
//! directory, so each server version observes whatever the previous one left
//! on disk. That leftover state is the point: it is what surfaces
//! ingest-old/read-new and ingest-new/read-old incompatibilities.
//!
//! The queried traces are printed for a human to inspect in the run logs;
//! the harness asserts on its own mechanics only, never on the server's
//! output.

pub mod config;
pub mod container;
pub mod health;
pub mod query;
pub mod scenario;
pub mod telemetry;
