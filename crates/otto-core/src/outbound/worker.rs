//! Delivery worker loop: claim due messages, ship via the transport, apply
//! exponential backoff with jitter on transient failure.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::config::DeliveryConfig;
use crate::repository::OutboundQueueRepository;

use super::transport::{SendOutcome, Transport};

/// Recommended transport call timeout (§5 concurrency model); a timeout is
/// treated as a `transient` outcome.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DeliveryWorker {
    repo: OutboundQueueRepository,
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl DeliveryWorker {
    pub fn new(repo: OutboundQueueRepository, transport: Arc<dyn Transport>, config: DeliveryConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            repo,
            transport,
            config,
            stop_tx,
            stop_rx,
        }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    #[instrument(skip(self))]
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_ms));
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "delivery tick failed");
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("delivery worker stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> crate::error::OttoResult<()> {
        let now = crate::now_millis();
        let due = self.repo.list_due(now, self.config.batch_limit)?;

        for msg in due {
            let outcome = match tokio::time::timeout(
                TRANSPORT_TIMEOUT,
                self.transport.send(msg.chat_id, &msg.content),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => SendOutcome::Transient,
            };

            let ts = crate::now_millis();
            match outcome {
                SendOutcome::Ok => {
                    self.repo.mark_sent(&msg.id, msg.attempt_count + 1, ts)?;
                }
                SendOutcome::Transient => {
                    let attempt_count = msg.attempt_count + 1;
                    if attempt_count > self.config.max_attempts as i64 {
                        self.repo.mark_failed(
                            &msg.id,
                            attempt_count,
                            "exceeded max delivery attempts",
                            ts,
                        )?;
                    } else {
                        let delay = backoff_with_jitter(
                            attempt_count as u32,
                            self.config.backoff_base_secs,
                            self.config.backoff_cap_secs,
                        );
                        let next_attempt_at = ts + delay.as_millis() as i64;
                        self.repo.mark_retry(
                            &msg.id,
                            attempt_count,
                            next_attempt_at,
                            "transient delivery failure",
                            ts,
                        )?;
                    }
                }
                SendOutcome::Permanent => {
                    self.repo.mark_failed(
                        &msg.id,
                        msg.attempt_count + 1,
                        "permanent delivery failure",
                        ts,
                    )?;
                }
            }
        }

        Ok(())
    }
}

/// Exponential backoff with `±25%` jitter: `base * 2^attempt`, capped at
/// `cap_secs`, then scaled by a uniform `[0.75, 1.25]` factor (§4.F).
pub fn backoff_with_jitter(attempt: u32, base_secs: u64, cap_secs: u64) -> Duration {
    let exp_secs = base_secs.saturating_mul(1u64 << attempt.min(32)).min(cap_secs);
    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    let secs = (exp_secs as f64 * jitter_factor).max(0.0);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_monotonically_ignoring_jitter() {
        // P5: nextAttemptAt strictly increases with attemptCount up to
        // maxAttempts, ignoring jitter bounds — check the unjittered
        // exponential curve underlying the jitter.
        let base = 5u64;
        let cap = 300u64;
        let mut prev = 0u64;
        for attempt in 1..8u32 {
            let exp = base.saturating_mul(1u64 << attempt.min(32)).min(cap);
            assert!(exp >= prev, "backoff should be non-decreasing before the cap");
            prev = exp;
        }
    }

    #[test]
    fn backoff_respects_cap() {
        let delay = backoff_with_jitter(20, 5, 300);
        // Even with +25% jitter the cap should bound the result to 375s.
        assert!(delay.as_secs_f64() <= 300.0 * 1.25 + 1.0);
    }
}
