use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::reloader::{ModelReloader, WatchOutcome};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::watcher";

use crate::{log_debug, log_error, log_info};

/// Polls the provider every `period` and swaps in newly published versions.
/// Failures keep the current model and are retried on the next tick.
pub async fn watch_loop(
    reloader: Arc<ModelReloader>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("model update watcher started (every {}s)", period.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reloader.check_for_update().await {
                    Ok(WatchOutcome::Unchanged { version }) => {
                        log_debug!("model version {version} unchanged");
                    }
                    Ok(WatchOutcome::Reloaded { previous, current }) => {
                        log_info!("model reloaded: {previous:?} -> {current}");
                    }
                    Err(err) => log_error!("model update check failed: {err:?}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("model update watcher shutting down");
                break;
            }
        }
    }
}
