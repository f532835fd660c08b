//! Sleep abstraction used by every wait in the pipeline
//!
//! Retry waits, the dispatch stagger and the round interval all go through
//! [`Clock`], so tests can run the loops without real time passing.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EngineError;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Wait for `duration`. Fails with [`EngineError::InterruptedWait`] when interrupted.
    async fn sleep(&self, duration: Duration) -> Result<(), EngineError>;
}

/// Real clock backed by `tokio::time::sleep`.
///
/// Cancelling the token interrupts any in-flight sleep. The token is never reset,
/// so once interrupted every later sleep fails immediately as well.
#[derive(Debug, Clone, Default)]
pub struct TokioClock {
    interrupt: CancellationToken,
}

impl TokioClock {
    pub fn new(interrupt: CancellationToken) -> Self {
        Self { interrupt }
    }

    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }
}

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        if self.interrupt.is_cancelled() {
            return Err(EngineError::InterruptedWait);
        }
        tokio::select! {
            _ = self.interrupt.cancelled() => {
                debug!(wait_secs = duration.as_secs(), "Sleep interrupted");
                Err(EngineError::InterruptedWait)
            }
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Clock that never waits and records every requested duration.
#[derive(Debug, Default)]
pub struct InstantClock {
    waits: parking_lot::Mutex<Vec<Duration>>,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// All durations requested so far, in call order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        self.waits.lock().push(duration);
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// Convert whole minutes into a sleep duration.
pub fn minutes(count: u64) -> Duration {
    Duration::from_secs(count * 60)
}
