//! Background idle-eviction loop.
//!
//! Sweeps once right after start, then every [`CleanupConfig::interval`].
//! Sweep errors are logged and the loop keeps going. Shutdown is observed
//! between sweeps, never in the middle of one.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::CleanupConfig;
use crate::generator::Generator;

pub struct CleanupService {
    generator: Arc<Generator>,
    config: CleanupConfig,
}

impl CleanupService {
    pub fn new(generator: Arc<Generator>, config: CleanupConfig) -> Self {
        Self { generator, config }
    }

    /// Spawns the loop on the current runtime.
    pub fn start(self) -> CleanupHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        CleanupHandle { shutdown, task }
    }

    /// Runs sweeps until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            max_idle_secs = self.config.max_idle_secs,
            "Cleanup loop starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.generator.clean_up(self.config.max_idle()).await {
                Ok(report) => debug!(
                    examined = report.examined,
                    evicted = report.evicted,
                    failed = report.failures.len(),
                    "Cleanup sweep done"
                ),
                Err(e) => error!("error when cleaning up: {}", e),
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }

        info!("Cleanup loop stopped");
    }
}

/// Owner of a running cleanup loop.
pub struct CleanupHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the loop and waits at most `grace` for it to finish the sweep in
    /// progress. Returns false if the loop had to be aborted or had panicked.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.shutdown.cancel();

        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Cleanup loop panicked: {:?}", e);
                false
            }
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs_f64(),
                    "Cleanup loop did not stop in time, aborting"
                );
                task.abort();
                false
            }
        }
    }
}
