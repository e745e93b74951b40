//! Pong watchdog for a single session.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;
use crate::config::ServerConfig;

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// `missed` consecutive checks passed without a pong.
    Unresponsive {
        /// Checks missed before giving up.
        missed: u32,
    },
    /// The session closed for another reason first.
    Stopped,
}

/// Checks a connection's pong flag on a fixed period.
///
/// The client is declared unresponsive after `budget` consecutive periods
/// without a pong, where `budget = timeout / period`, at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watchdog {
    period: Duration,
    budget: u32,
}

impl Watchdog {
    /// Build from an explicit period and total timeout.
    pub fn new(period: Duration, timeout: Duration) -> Self {
        let periods = timeout.as_millis() / period.as_millis().max(1);
        let budget = u32::try_from(periods).unwrap_or(u32::MAX).max(1);
        Self { period, budget }
    }

    /// Build from the configured ping interval and pong timeout.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.heartbeat_interval(), config.heartbeat_timeout())
    }

    /// Consecutive silent periods tolerated.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Watch `connection` until it goes quiet or `stop` fires.
    pub async fn watch(self, connection: Arc<ClientConnection>, stop: CancellationToken) -> Verdict {
        let mut ticker = tokio::time::interval(self.period);
        // Nothing has been pinged at the immediate first tick.
        let _ = ticker.tick().await;

        let mut missed = 0;
        loop {
            tokio::select! {
                () = stop.cancelled() => return Verdict::Stopped,
                _ = ticker.tick() => {
                    if connection.take_heard() {
                        missed = 0;
                        continue;
                    }
                    missed += 1;
                    if missed >= self.budget {
                        return Verdict::Unresponsive { missed };
                    }
                }
            }
        }
    }
}
