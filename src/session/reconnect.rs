use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, SessionError};

/// Bounded exponential backoff around channel establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before the given attempt (1-based): base * 2^(attempt-1), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let factor = 1u64 << exp;
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Initial establishment: first attempt immediately, backoff between retries
    pub async fn connect<T, F, Fut>(&self, attempt_fn: F, cancelled: &AtomicBool) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.drive(attempt_fn, cancelled, false).await
    }

    /// Recovery after an abnormal disconnect: backoff before every attempt
    pub async fn reconnect<T, F, Fut>(&self, attempt_fn: F, cancelled: &AtomicBool) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.drive(attempt_fn, cancelled, true).await
    }

    async fn drive<T, F, Fut>(
        &self,
        mut attempt_fn: F,
        cancelled: &AtomicBool,
        delay_first: bool,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            if attempt > 1 || delay_first {
                let delay = self.delay_for(if delay_first { attempt } else { attempt - 1 });
                info!("Retrying connection in {:?} (attempt {}/{})", delay, attempt, max_attempts);
                tokio::time::sleep(delay).await;
            }

            // Caller-initiated close wins over any further attempt
            if cancelled.load(Ordering::SeqCst) {
                return Err(SessionError::Closed);
            }

            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(SessionError::Closed) => return Err(SessionError::Closed),
                Err(e) => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SessionError::ReconnectExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
