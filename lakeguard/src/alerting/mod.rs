//! Alert escalation state machine and background ticker.
//!
//! Each open alert walks `New -> Level1 -> Level2 -> Level3` until it is
//! acknowledged or reaches the last level. A periodic ticker, decoupled from
//! validation execution, promotes unacknowledged alerts whose level delay has
//! elapsed and notifies that level's contacts.

pub mod notify;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, info, instrument, warn};

pub use notify::{
    Notification, NotificationChannel, NotificationDispatcher, Notifier, RetryPolicy,
    TracingNotifier,
};

use crate::error::{GuardError, Result};
use crate::thresholds::Severity;

/// One step in the alert notification schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevel {
    /// 1-based level number
    pub level: u32,
    /// Delay from alert creation before this level applies
    pub delay_from_creation: Duration,
    /// Contacts notified when this level is reached
    pub contacts: Vec<String>,
}

/// A quality incident being escalated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    /// Layer-qualified dataset name
    pub dataset: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    /// Current level; non-decreasing, frozen once acknowledged
    pub escalation_level: u32,
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// How many validation runs coalesced into this alert
    pub occurrences: u32,
    pub last_seen: DateTime<Utc>,
    /// Human-readable incident summary
    pub summary: String,
}

impl AlertEvent {
    /// Returns true while the alert can still escalate.
    pub fn is_open(&self) -> bool {
        self.acknowledged_at.is_none()
    }
}

/// Configuration for the escalation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Levels in ascending order; the first applies at creation
    pub levels: Vec<EscalationLevel>,
    /// Window within which repeat alerts for the same dataset and severity
    /// coalesce into the open alert
    pub cooldown: Duration,
    /// Ticker period for escalation checks
    pub tick_interval: Duration,
    /// Channels every notification is sent through
    pub channels: Vec<NotificationChannel>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                EscalationLevel {
                    level: 1,
                    delay_from_creation: Duration::ZERO,
                    contacts: vec!["data_engineer@example.com".to_string()],
                },
                EscalationLevel {
                    level: 2,
                    delay_from_creation: Duration::from_secs(30 * 60),
                    contacts: vec!["data_lead@example.com".to_string()],
                },
                EscalationLevel {
                    level: 3,
                    delay_from_creation: Duration::from_secs(60 * 60),
                    contacts: vec!["cto@example.com".to_string()],
                },
            ],
            cooldown: Duration::from_secs(15 * 60),
            tick_interval: Duration::from_secs(30),
            channels: vec![NotificationChannel::Email, NotificationChannel::Chat],
        }
    }
}

/// Counters describing escalation activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscalationStats {
    pub alerts_raised: u64,
    pub alerts_coalesced: u64,
    pub escalations: u64,
    pub acknowledgments: u64,
}

/// Open alert plus the monotonic instants escalation timing is computed from.
///
/// Wall-clock timestamps on the event are for records; scheduling uses the
/// runtime clock so it stays consistent under test time control.
#[derive(Debug, Clone)]
struct AlertState {
    event: AlertEvent,
    created: Instant,
    last_seen: Instant,
}

/// Stateful, timer-driven alert escalation and notification dispatch.
pub struct EscalationManager {
    config: EscalationConfig,
    dispatcher: Arc<NotificationDispatcher>,
    alerts: Arc<RwLock<HashMap<String, AlertState>>>,
    stats: Arc<RwLock<EscalationStats>>,
    seq: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl EscalationManager {
    /// Creates a manager. Call [`start`] to run the background ticker.
    ///
    /// [`start`]: EscalationManager::start
    pub fn new(config: EscalationConfig, dispatcher: Arc<NotificationDispatcher>) -> Result<Self> {
        if config.levels.is_empty() {
            return Err(GuardError::configuration(
                "Escalation workflow requires at least one level",
            ));
        }
        for pair in config.levels.windows(2) {
            if pair[1].delay_from_creation <= pair[0].delay_from_creation {
                return Err(GuardError::configuration(
                    "Escalation level delays must be strictly increasing",
                ));
            }
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            dispatcher,
            alerts: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(EscalationStats::default())),
            seq: AtomicU64::new(0),
            shutdown_tx,
            ticker: Mutex::new(None),
        })
    }

    /// Spawns the background escalation ticker.
    pub async fn start(self: &Arc<Self>) {
        let mut ticker_slot = self.ticker.lock().await;
        if ticker_slot.is_some() {
            return;
        }

        let manager = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(manager.config.tick_interval);
            info!(
                tick_ms = manager.config.tick_interval.as_millis() as u64,
                "Escalation ticker started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.escalate_due(Instant::now()).await;
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Escalation ticker stopping");
                            break;
                        }
                    }
                }
            }
        });
        *ticker_slot = Some(handle);
    }

    /// Stops the ticker and waits for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.ticker.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Escalation ticker join failed");
            }
        }
    }

    /// Raises an alert for a dataset, coalescing repeats within the cooldown
    /// window into the existing open alert.
    ///
    /// Returns the (new or coalesced) alert snapshot.
    #[instrument(skip(self, summary), fields(dataset = %dataset, severity = %severity))]
    pub async fn raise(
        &self,
        dataset: &str,
        severity: Severity,
        summary: impl Into<String>,
    ) -> AlertEvent {
        let wall_now = Utc::now();
        let now = Instant::now();

        let mut alerts = self.alerts.write().await;
        let existing = alerts.values_mut().find(|state| {
            state.event.is_open()
                && state.event.dataset == dataset
                && state.event.severity == severity
                && now.duration_since(state.last_seen) <= self.config.cooldown
        });

        if let Some(state) = existing {
            state.event.occurrences += 1;
            state.event.last_seen = wall_now;
            state.last_seen = now;
            debug!(
                alert.id = %state.event.id,
                occurrences = state.event.occurrences,
                "Alert coalesced"
            );
            let snapshot = state.event.clone();
            drop(alerts);
            self.stats.write().await.alerts_coalesced += 1;
            return snapshot;
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let first_level = &self.config.levels[0];
        let alert = AlertEvent {
            id: format!("alert-{}-{seq}", wall_now.timestamp_millis()),
            dataset: dataset.to_string(),
            severity,
            created_at: wall_now,
            escalation_level: first_level.level,
            acknowledged_at: None,
            occurrences: 1,
            last_seen: wall_now,
            summary: summary.into(),
        };
        alerts.insert(
            alert.id.clone(),
            AlertState {
                event: alert.clone(),
                created: now,
                last_seen: now,
            },
        );
        drop(alerts);

        self.stats.write().await.alerts_raised += 1;
        info!(alert.id = %alert.id, level = first_level.level, "Alert created");
        self.notify_level(&alert, first_level);
        alert
    }

    /// Acknowledges an alert, freezing its level and stopping escalation.
    pub async fn acknowledge(&self, alert_id: &str) -> Result<AlertEvent> {
        let mut alerts = self.alerts.write().await;
        let state = alerts
            .get_mut(alert_id)
            .ok_or_else(|| GuardError::Internal(format!("Unknown alert '{alert_id}'")))?;

        if state.event.acknowledged_at.is_none() {
            state.event.acknowledged_at = Some(Utc::now());
            info!(
                alert.id = %alert_id,
                level = state.event.escalation_level,
                "Alert acknowledged"
            );
            let snapshot = state.event.clone();
            drop(alerts);
            self.stats.write().await.acknowledgments += 1;
            return Ok(snapshot);
        }
        Ok(state.event.clone())
    }

    /// Returns a snapshot of one alert.
    pub async fn get(&self, alert_id: &str) -> Option<AlertEvent> {
        self.alerts
            .read()
            .await
            .get(alert_id)
            .map(|state| state.event.clone())
    }

    /// Returns snapshots of all open alerts.
    pub async fn open_alerts(&self) -> Vec<AlertEvent> {
        self.alerts
            .read()
            .await
            .values()
            .filter(|state| state.event.is_open())
            .map(|state| state.event.clone())
            .collect()
    }

    /// Returns the escalation counters.
    pub async fn stats(&self) -> EscalationStats {
        *self.stats.read().await
    }

    /// Promotes every open alert whose next level delay has elapsed.
    ///
    /// Levels are walked one at a time so each transition notifies its own
    /// contact list, even when several ticks were missed.
    pub async fn escalate_due(&self, now: Instant) {
        let due: Vec<(AlertEvent, EscalationLevel)> = {
            let mut alerts = self.alerts.write().await;
            let mut transitions = Vec::new();
            for state in alerts.values_mut().filter(|s| s.event.is_open()) {
                let elapsed = now.saturating_duration_since(state.created);
                while let Some(next) = self
                    .config
                    .levels
                    .iter()
                    .find(|l| l.level == state.event.escalation_level + 1)
                {
                    if elapsed < next.delay_from_creation {
                        break;
                    }
                    state.event.escalation_level = next.level;
                    transitions.push((state.event.clone(), next.clone()));
                }
            }
            transitions
        };

        if due.is_empty() {
            return;
        }

        self.stats.write().await.escalations += due.len() as u64;
        for (alert, level) in due {
            info!(
                alert.id = %alert.id,
                dataset = %alert.dataset,
                level = level.level,
                "Alert escalated"
            );
            self.notify_level(&alert, &level);
        }
    }

    /// Queues the level's notification on every configured channel.
    ///
    /// Delivery runs on spawned tasks so retry backoff never stalls the
    /// caller; failures degrade to logged drops inside the dispatcher.
    fn notify_level(&self, alert: &AlertEvent, level: &EscalationLevel) {
        let message = format!(
            "[L{}] {} quality alert for {}: {} (occurrences: {})",
            level.level, alert.severity, alert.dataset, alert.summary, alert.occurrences
        );
        for channel in &self.config.channels {
            let notification = Notification {
                channel: *channel,
                message: message.clone(),
                severity: alert.severity,
                contacts: level.contacts.clone(),
            };
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                dispatcher.dispatch(&notification).await;
            });
        }
    }
}
