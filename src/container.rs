//! Launching and tearing down the server container through the engine CLI.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::HarnessConfig;

/// Handle to a `docker run` invocation hosting one Quickwit instance.
///
/// Exclusively owned by the current iteration; release it with
/// [`ServerContainer::shutdown`]. Dropping an un-released handle
/// force-removes the named container as a backstop, so a faulted iteration
/// cannot leave it squatting on the fixed ports. Removing an already-gone
/// container is a tolerated no-op, which keeps the backstop safe to run
/// unconditionally.
pub struct ServerContainer {
    child: Child,
    name: String,
    engine: String,
    removed: bool,
}

/// Starts `image` with the fixed port and volume mappings, redirecting the
/// container's stdout to `log_file` inside `run_dir`.
///
/// Returns as soon as the engine process is spawned; readiness is the
/// caller's concern. The data volume lives at `run_dir/qwdata` and is shared
/// by every run, so a later image sees what an earlier one wrote.
pub fn launch(
    cfg: &HarnessConfig,
    run_dir: &Path,
    image: &str,
    log_file: &str,
) -> Result<ServerContainer> {
    info!(image, "running quickwit");
    let log_path = run_dir.join(log_file);
    let log = std::fs::File::create(&log_path)
        .with_context(|| format!("failed to create {}", log_path.display()))?;
    let child = Command::new(&cfg.engine)
        .args(run_args(cfg, run_dir, image))
        .stdout(Stdio::from(log))
        // The engine client has nothing left to do once the container is
        // removed; reap it instead of orphaning it.
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn `{} run` for {image}", cfg.engine))?;
    Ok(ServerContainer {
        child,
        name: cfg.container_name.clone(),
        engine: cfg.engine.clone(),
        removed: false,
    })
}

/// Argument vector of the `run` invocation. `run_dir` must be absolute, the
/// engine rejects relative host paths in volume mappings.
fn run_args(cfg: &HarnessConfig, run_dir: &Path, image: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "--name".to_string(),
        cfg.container_name.clone(),
        "-e".to_string(),
        "NO_COLOR=1".to_string(),
        "-e".to_string(),
        "QW_ENABLE_OTLP_ENDPOINT=true".to_string(),
        "-p".to_string(),
        format!("{port}:{port}", port = cfg.rest_port),
        "-p".to_string(),
        format!("{port}:{port}", port = cfg.otlp_port),
        "-v".to_string(),
        format!("{}/qwdata:/quickwit/qwdata", run_dir.display()),
        image.to_string(),
        "run".to_string(),
    ]
}

impl ServerContainer {
    /// Requests graceful termination, waits up to `timeout` for the process
    /// to exit, then force-removes the named container no matter how the
    /// wait went.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!(container = %self.name, "shutting down quickwit");
        self.terminate();
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "container process exited"),
            Ok(Err(err)) => warn!(%err, "failed waiting for the container process"),
            Err(_) => warn!("quickwit did not shut down in time, killing the container"),
        }
        self.force_remove().await;
        self.removed = true;
    }

    /// SIGTERM to the engine process, which forwards it to the server.
    fn terminate(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(%err, "failed to signal the container process");
            }
        }
        #[cfg(not(unix))]
        {
            warn!("no graceful termination on this platform, relying on forced removal");
        }
    }

    /// `rm -f` through the engine CLI. Failures are logged and swallowed;
    /// the container may legitimately be gone already.
    async fn force_remove(&self) {
        let result = Command::new(&self.engine)
            .args(["rm", "-f", &self.name])
            .output()
            .await;
        match result {
            Ok(output) if !output.status.success() => {
                warn!(status = %output.status, "container removal reported failure")
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "failed to invoke container removal"),
        }
    }
}

impl Drop for ServerContainer {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        // Synchronous on purpose: an unreleased handle may be dropped while
        // unwinding, with no runtime left to await on.
        let _ = std::process::Command::new(&self.engine)
            .args(["rm", "-f", &self.name])
            .output();
    }
}
