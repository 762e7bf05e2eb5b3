//! Reconnect helper.
//!
//! Process and in-process targets are reconnected with a fixed number of
//! attempts and a fixed pause in between. Network targets are connected once;
//! their failures usually need a human (OAuth, a wrong URL) rather than time.

use crate::error::GatewayResult;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of connect attempts.
pub const RECONNECT_ATTEMPTS: u32 = 3;

/// Pause between attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2500);

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: RECONNECT_ATTEMPTS,
            delay: RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Run `attempt` until it succeeds or the attempts are used up. The last
    /// error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> GatewayResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut current = 1;

        loop {
            match attempt(current).await {
                Ok(value) => {
                    if current > 1 {
                        debug!(target_name = %label, attempt = current, "Reconnected");
                    }
                    return Ok(value);
                }
                Err(e) if current < attempts => {
                    warn!(
                        target_name = %label,
                        attempt = current,
                        max = attempts,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    tokio::time::sleep(self.delay).await;
                    current += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
