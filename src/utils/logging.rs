//! Component-gated logging macros.
//!
//! Every module that logs through these macros declares two constants:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "heartwatch::drift";
//! ```
//! Records are dropped when `ENABLE_LOGS` is false and otherwise emitted under
//! `LOG_TARGET`, so `RUST_LOG=heartwatch::drift=debug` narrows output to a
//! single background component.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Errors bypass `ENABLE_LOGS`: a failed cycle is always reported.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        log::error!(target: LOG_TARGET, $($arg)*);
    }};
}

#[cfg(test)]
mod tests {
    const ENABLE_LOGS: bool = false;
    const LOG_TARGET: &str = "heartwatch::test";

    #[test]
    fn macros_work_as_match_arms() {
        for outcome in [Ok(1), Err("boom")] {
            match outcome {
                Ok(value) => crate::log_debug!("value {value}"),
                Err(err) => crate::log_error!("failed: {err}"),
            }
        }
    }
}
