use crate::config::DelayRange;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Returns a token that is cancelled on the first Ctrl+C.
    ///
    /// Drivers check it between steps only, so a step that already started
    /// always runs to completion and persists its result.
    pub fn shutdown_token() -> CancellationToken {
        let token = CancellationToken::new();
        let cloned_token = token.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C. Stopping after the current step...");
                    cloned_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        token
    }

    /// Sleeps for a random duration drawn from `range`.
    ///
    /// Returns `false` if the token was cancelled before the delay elapsed.
    pub async fn pause(range: &DelayRange, token: &CancellationToken) -> bool {
        let delay = range.sample();
        if delay.is_zero() {
            return !token.is_cancelled();
        }

        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
