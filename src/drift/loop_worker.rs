use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::evaluator::{CycleOutcome, DriftEvaluator};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::drift";

use crate::{log_debug, log_error, log_info};

/// Runs a drift cycle every `period` until `cancel_token` fires. A failed
/// cycle is logged and the next tick starts a fresh one.
pub async fn drift_loop(
    evaluator: Arc<DriftEvaluator>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("drift monitor started (every {}s)", period.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match evaluator.run_cycle().await {
                    Ok(CycleOutcome::Published { drained, scores, .. }) => {
                        log_debug!("drift cycle scored {} features over {} predictions", scores.len(), drained);
                    }
                    Ok(_) => {}
                    Err(err) => log_error!("drift cycle failed: {err:?}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("drift monitor shutting down");
                break;
            }
        }
    }
}
