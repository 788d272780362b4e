//! The push relay: a background loop that drains undelivered notification
//! records through a transport and stamps the ones the transport accepted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mendflow_db::repositories::{NotificationStore, RepositoryError};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::transport::{PushMessage, PushTransport};

/// Backoff schedule for outbox reads that fail. Delays double per
/// consecutive failure and cap at `max_delay_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << exponent).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// One polling cycle's tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub delivered: usize,
    pub failed: usize,
}

pub struct PushRelay {
    notifications: Arc<dyn NotificationStore>,
    transport: Arc<dyn PushTransport>,
    poll_interval: Duration,
    batch_size: u32,
    retry_policy: RetryPolicy,
}

impl PushRelay {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        transport: Arc<dyn PushTransport>,
        poll_interval: Duration,
        batch_size: u32,
    ) -> Self {
        Self {
            notifications,
            transport,
            poll_interval,
            batch_size,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Runs the relay until its task is dropped. Outbox failures back off
    /// per the retry policy; once `max_retries` consecutive failures are
    /// spent the relay logs, waits out one poll interval, and starts the
    /// ladder over. Push degrading must never take the process down, so
    /// this loop has no error exit.
    pub async fn run(&self) {
        info!(
            event_name = "push.relay_started",
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "push relay started"
        );

        let mut consecutive_failures: u32 = 0;
        loop {
            match self.drain_pending().await {
                Ok(outcome) => {
                    consecutive_failures = 0;
                    if outcome.delivered > 0 || outcome.failed > 0 {
                        debug!(
                            event_name = "push.cycle_finished",
                            delivered = outcome.delivered,
                            failed = outcome.failed,
                            "push cycle finished"
                        );
                    }
                    sleep(self.poll_interval).await;
                }
                Err(error) => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.retry_policy.max_retries {
                        warn!(
                            event_name = "push.outbox_retries_exhausted",
                            max_retries = self.retry_policy.max_retries,
                            error = %error,
                            "outbox retries exhausted; continuing relay without crash"
                        );
                        consecutive_failures = 0;
                        sleep(self.poll_interval).await;
                        continue;
                    }

                    warn!(
                        event_name = "push.outbox_unavailable",
                        attempt = consecutive_failures,
                        max_retries = self.retry_policy.max_retries,
                        error = %error,
                        "outbox read failed; backing off"
                    );
                    let delay = self.retry_policy.backoff(consecutive_failures - 1);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Fetches one batch of undelivered records, oldest first, and pushes
    /// each through the transport. Records the transport rejects stay
    /// undelivered and return in a later batch; accepted ones are stamped
    /// in a single write after the batch.
    pub async fn drain_pending(&self) -> Result<DrainOutcome, RepositoryError> {
        let pending = self.notifications.list_undelivered(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(DrainOutcome::default());
        }

        let mut outcome = DrainOutcome::default();
        let mut accepted = Vec::with_capacity(pending.len());
        for record in &pending {
            let message = PushMessage::from_record(record);
            match self.transport.deliver(&message).await {
                Ok(()) => {
                    accepted.push(record.id.clone());
                    outcome.delivered += 1;
                    debug!(
                        event_name = "push.delivered",
                        notification_id = %record.id.0,
                        recipient_id = %record.recipient_id.0,
                        "push delivered"
                    );
                }
                Err(error) => {
                    outcome.failed += 1;
                    warn!(
                        event_name = "push.delivery_failed",
                        notification_id = %record.id.0,
                        recipient_id = %record.recipient_id.0,
                        error = %error,
                        "push delivery failed; record stays queued"
                    );
                }
            }
        }

        if !accepted.is_empty() {
            self.notifications.mark_delivered(&accepted, Utc::now()).await?;
        }

        Ok(outcome)
    }
}
