//! Fixed-deadline timer for bounded waits.
//!
//! The sender waits a fixed time for each round of acknowledgments and for
//! each FIN-ACK; the receiver lingers for a fixed time after closing.  All of
//! these are "wait for packets until a deadline", which [`RoundTimer`]
//! expresses on top of `tokio::time`.  There is no RTT estimation and no
//! back-off: the timeout stays constant for the whole transfer.

use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, timeout_at, Instant};

/// A restartable deadline of constant length.
#[derive(Debug, Clone)]
pub struct RoundTimer {
    timeout: Duration,
    deadline: Instant,
}

impl RoundTimer {
    /// Create a timer and arm it immediately.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Restart the deadline `timeout` from now.
    pub fn arm(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drive `fut` until it completes or the current deadline passes.
    ///
    /// Several calls within one round share the same deadline, so a stream of
    /// useless packets cannot extend the wait.
    pub async fn wait<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        timeout_at(self.deadline, fut).await
    }
}
