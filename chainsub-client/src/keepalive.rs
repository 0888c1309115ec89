//! Keepalive loop
//!
//! A transport-level ping is written every `ping_interval`. The reader
//! pushes the read deadline forward by `pong_timeout` whenever a pong
//! arrives, and treats the deadline passing as a dead connection. The
//! loop itself never declares the connection dead: a failed ping write
//! just ends the loop and leaves detection to the reader.

use crate::metrics::ClientMetrics;
use crate::transport::Outbound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Read deadline shared between the keepalive loop and the reader
pub(crate) struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
    base: Instant,
    /// Deadline as milliseconds past `base`
    deadline_ms: AtomicU64,
}

impl Keepalive {
    pub(crate) fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        let keepalive = Self {
            ping_interval,
            pong_timeout,
            base: Instant::now(),
            deadline_ms: AtomicU64::new(0),
        };
        keepalive.arm();
        keepalive
    }

    /// Set the deadline to one pong timeout from now
    pub(crate) fn arm(&self) {
        let deadline = self.base.elapsed() + self.pong_timeout;
        self.deadline_ms
            .store(deadline.as_millis() as u64, Ordering::Release);
    }

    /// A pong arrived
    pub(crate) fn on_pong(&self) {
        self.arm();
    }

    /// Current read deadline
    pub(crate) fn deadline(&self) -> Instant {
        self.base + Duration::from_millis(self.deadline_ms.load(Ordering::Acquire))
    }

    /// Whether the deadline has passed
    pub(crate) fn expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    /// Ping until cancelled or a write fails
    pub(crate) async fn run(
        self: Arc<Self>,
        outbound: Arc<Outbound>,
        metrics: Option<Arc<ClientMetrics>>,
        cancel: CancellationToken,
    ) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = outbound.send(Message::Ping(Vec::new())).await {
                        tracing::warn!(error = %e, "Keepalive ping failed, stopping keepalive");
                        if let Some(ref m) = metrics {
                            m.record_error("ping");
                        }
                        break;
                    }
                    tracing::trace!("Ping sent");
                    if let Some(ref m) = metrics {
                        m.record_ping();
                    }
                }
            }
        }

        tracing::debug!("Keepalive loop stopped");
    }
}
