//! Notification channels with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::thresholds::Severity;

/// Delivery channel for quality notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Chat,
    Webhook,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Chat => write!(f, "chat"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: NotificationChannel,
    pub message: String,
    pub severity: Severity,
    /// Contacts the message is addressed to
    pub contacts: Vec<String>,
}

/// Delivery seam for the external notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification. Implementations should return an error for
    /// transient failures; the dispatcher handles retries.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Default notifier that records deliveries as structured log events.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            channel = %notification.channel,
            severity = %notification.severity,
            contacts = notification.contacts.len(),
            message = %notification.message,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Retry policy for notification delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds, doubled per retry
    pub base_delay_ms: u64,
    /// Cap on the backoff exponent
    pub max_exponent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_exponent: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (0-based), with jitter.
    fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.min(self.max_exponent);
        let delay_ms = self.base_delay_ms * (1u64 << exponent);
        let jitter_ms = rand::rng().random_range(0..250);
        Duration::from_millis(delay_ms + jitter_ms)
    }
}

/// Dispatches notifications through a [`Notifier`] with bounded exponential
/// backoff. Exhausted deliveries are logged and dropped; dispatch never
/// fails the validation path.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    /// Creates a dispatcher over the given notifier.
    pub fn new(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        Self { notifier, policy }
    }

    /// Attempts delivery, retrying transient failures. Returns whether the
    /// notification was ultimately delivered.
    pub async fn dispatch(&self, notification: &Notification) -> bool {
        for attempt in 0..self.policy.max_attempts {
            match self.notifier.send(notification).await {
                Ok(()) => {
                    debug!(
                        channel = %notification.channel,
                        attempt = attempt + 1,
                        "Notification sent"
                    );
                    return true;
                }
                Err(err) => {
                    let remaining = self.policy.max_attempts - attempt - 1;
                    if remaining == 0 {
                        warn!(
                            channel = %notification.channel,
                            severity = %notification.severity,
                            error = %err,
                            attempts = self.policy.max_attempts,
                            "Notification dropped after retries exhausted"
                        );
                        return false;
                    }
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        channel = %notification.channel,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "Notification delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    use crate::error::GuardError;

    /// Notifier that fails a fixed number of times, then succeeds, recording
    /// every delivery it accepts.
    #[derive(Default)]
    pub(crate) struct FlakyNotifier {
        failures_remaining: AtomicU32,
        pub delivered: Mutex<Vec<Notification>>,
    }

    impl FlakyNotifier {
        fn failing(n: u32) -> Self {
            Self {
                failures_remaining: AtomicU32::new(n),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, notification: &Notification) -> Result<()> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(GuardError::notification(
                    notification.channel.to_string(),
                    "simulated outage",
                ));
            }
            self.delivered.lock().await.push(notification.clone());
            Ok(())
        }
    }

    fn notification() -> Notification {
        Notification {
            channel: NotificationChannel::Chat,
            message: "gold/fact_sales quality degraded".to_string(),
            severity: Severity::High,
            contacts: vec!["data_engineer@example.com".to_string()],
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_exponent: 2,
        }
    }

    #[tokio::test]
    async fn test_dispatch_succeeds_first_try() {
        let notifier = Arc::new(FlakyNotifier::failing(0));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), fast_policy(3));

        assert!(dispatcher.dispatch(&notification()).await);
        assert_eq!(notifier.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_retries_then_succeeds() {
        let notifier = Arc::new(FlakyNotifier::failing(2));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), fast_policy(3));

        assert!(dispatcher.dispatch(&notification()).await);
        assert_eq!(notifier.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_drops_after_cap() {
        let notifier = Arc::new(FlakyNotifier::failing(10));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), fast_policy(3));

        assert!(!dispatcher.dispatch(&notification()).await);
        assert!(notifier.delivered.lock().await.is_empty());
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_exponent: 3,
        };
        let b0 = policy.backoff(0);
        assert!(b0 >= Duration::from_millis(100) && b0 < Duration::from_millis(350));

        let b2 = policy.backoff(2);
        assert!(b2 >= Duration::from_millis(400) && b2 < Duration::from_millis(650));

        // Exponent capped at 3 regardless of retry count
        let b9 = policy.backoff(9);
        assert!(b9 >= Duration::from_millis(800) && b9 < Duration::from_millis(1050));
    }
}
