use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::drift::{drift_loop, DriftEvaluator};
use crate::watcher::{watch_loop, ModelReloader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorIntervals {
    pub drift: Duration,
    pub watch: Duration,
}

impl Default for MonitorIntervals {
    fn default() -> Self {
        Self {
            drift: Duration::from_secs(180),
            watch: Duration::from_secs(600),
        }
    }
}

/// Owns the two background loops. They never talk to each other; each one
/// only writes to its shared store (gauges or the active model).
#[derive(Default)]
pub struct MonitorController {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl MonitorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn start(
        &mut self,
        evaluator: Arc<DriftEvaluator>,
        reloader: Arc<ModelReloader>,
        intervals: MonitorIntervals,
    ) -> Result<()> {
        if self.is_running() {
            bail!("monitor already running");
        }

        let cancel_token = CancellationToken::new();
        self.handles.push(tokio::spawn(drift_loop(
            evaluator,
            intervals.drift,
            cancel_token.child_token(),
        )));
        self.handles.push(tokio::spawn(watch_loop(
            reloader,
            intervals.watch,
            cancel_token.child_token(),
        )));
        self.cancel_token = Some(cancel_token);

        info!(
            "background monitor started (drift every {}s, model check every {}s)",
            intervals.drift.as_secs(),
            intervals.watch.as_secs()
        );
        Ok(())
    }

    /// Signals both loops and waits for them to reach their exit point.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for handle in self.handles.drain(..) {
            handle
                .await
                .context("monitor loop task failed to join")?;
        }
        Ok(())
    }
}
