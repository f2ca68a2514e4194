//! Alert dispatch logic.
//!
//! Each cycle reads the latest snapshot, finds every subscriber whose
//! threshold is satisfied and sends one notification per match. There is no
//! "already notified" marker: a subscriber keeps getting alerts every cycle
//! for as long as the condition holds.

use crate::config::Comparison;
use crate::db::{Database, StoreError};
use crate::telegram::format_alert_message;
use async_trait::async_trait;
use gasalert_core::{SnapshotReader, TierKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure to deliver one notification.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Outbound side of the messaging front-end.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver an alert message to a subscriber.
    async fn send_alert(&self, subscriber_id: &str, message: &str) -> Result<(), DeliveryError>;
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Tier whose rate is compared against thresholds.
    pub tier: TierKind,
    /// Direction of the comparison.
    pub comparison: Comparison,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tier: TierKind::Average,
            comparison: Comparison::RateAtOrAbove,
        }
    }
}

/// Result of one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No snapshot has been published yet; nothing was checked.
    NoSnapshot,
    Dispatched {
        /// Snapshot the cycle was evaluated against.
        sequence: u64,
        rate_gwei: u64,
        matched: usize,
        delivered: usize,
        failed: usize,
    },
}

/// Compares the current snapshot against subscriptions and fans out alerts.
pub struct AlertDispatcher {
    db: Database,
    snapshots: SnapshotReader,
    sink: Arc<dyn AlertSink>,
    config: DispatcherConfig,
}

impl AlertDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        db: Database,
        snapshots: SnapshotReader,
        sink: Arc<dyn AlertSink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            db,
            snapshots,
            sink,
            config,
        }
    }

    /// Run one dispatch cycle.
    pub async fn run_cycle(&self) -> Result<DispatchOutcome, DispatchError> {
        let Some(snapshot) = self.snapshots.current() else {
            debug!("No gas price snapshot yet, skipping alert dispatch");
            return Ok(DispatchOutcome::NoSnapshot);
        };

        let tier = snapshot.tier(self.config.tier);
        let rate = i64::try_from(tier.rate_gwei).unwrap_or(i64::MAX);
        let subscribers = self.db.query_matching(rate, self.config.comparison).await?;

        let matched = subscribers.len();
        let mut delivered = 0usize;
        let mut failed = 0usize;

        if matched > 0 {
            let message = format_alert_message(tier.rate_gwei, tier.cost_usd);

            for subscriber_id in &subscribers {
                match self.sink.send_alert(subscriber_id, &message).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(
                            subscriber = subscriber_id.as_str(),
                            error = %e,
                            "Failed to deliver gas alert"
                        );
                    }
                }
            }

            info!(
                rate_gwei = tier.rate_gwei,
                fetched_at = %snapshot.fetched_at(),
                comparison = self.config.comparison.symbol(),
                matched,
                delivered,
                failed,
                "Gas alerts dispatched"
            );
        } else {
            debug!(
                rate_gwei = tier.rate_gwei,
                "No subscriptions matched current gas price"
            );
        }

        Ok(DispatchOutcome::Dispatched {
            sequence: snapshot.sequence(),
            rate_gwei: tier.rate_gwei,
            matched,
            delivered,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gasalert_core::{FeeRates, PriceSnapshot, SnapshotCell};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Sink that records every message and can be told to reject a subscriber.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        reject: Option<String>,
    }

    impl RecordingSink {
        fn rejecting(subscriber_id: &str) -> Self {
            Self {
                reject: Some(subscriber_id.to_string()),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            let mut sent = self.sent.lock().unwrap().clone();
            sent.sort();
            sent
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send_alert(&self, subscriber_id: &str, message: &str) -> Result<(), DeliveryError> {
            if self.reject.as_deref() == Some(subscriber_id) {
                return Err(DeliveryError("chat not found".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subscriber_id.to_string(), message.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        db: Database,
        cell: SnapshotCell,
        sink: Arc<RecordingSink>,
        dispatcher: AlertDispatcher,
    }

    async fn fixture_with_sink(sink: RecordingSink) -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let cell = SnapshotCell::new();
        let sink = Arc::new(sink);
        let dispatcher = AlertDispatcher::new(
            db.clone(),
            cell.reader(),
            sink.clone(),
            DispatcherConfig::default(),
        );
        Fixture {
            db,
            cell,
            sink,
            dispatcher,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_sink(RecordingSink::default()).await
    }

    fn publish(cell: &SnapshotCell, sequence: u64, average: u64, usd_per_eth: f64) {
        let rates = FeeRates::new(average.saturating_sub(5), average, average + 10);
        assert!(cell.publish(PriceSnapshot::derive(sequence, rates, usd_per_eth, Utc::now())));
    }

    #[tokio::test]
    async fn test_no_snapshot_is_noop() {
        let f = fixture().await;
        f.db.upsert_subscription("A", 0).await.unwrap();

        let outcome = f.dispatcher.run_cycle().await.unwrap();

        assert_eq!(outcome, DispatchOutcome::NoSnapshot);
        assert!(f.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_no_subscriptions_no_notifications() {
        let f = fixture().await;
        publish(&f.cell, 1, 25, 2000.0);

        let outcome = f.dispatcher.run_cycle().await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched {
                sequence: 1,
                rate_gwei: 25,
                matched: 0,
                delivered: 0,
                failed: 0,
            }
        );
        assert!(f.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_reached_notifies() {
        let f = fixture().await;
        f.db.upsert_subscription("A", 20).await.unwrap();
        publish(&f.cell, 1, 25, 2000.0);

        f.dispatcher.run_cycle().await.unwrap();

        // 25 gwei * 21000 gas at $2000 = $1.05
        assert_eq!(
            f.sink.sent(),
            vec![("A".to_string(), "Gas price is 25 gwei or 1.05$".to_string())]
        );
    }

    #[tokio::test]
    async fn test_threshold_not_reached_no_notification() {
        let f = fixture().await;
        f.db.upsert_subscription("A", 20).await.unwrap();
        publish(&f.cell, 1, 15, 2000.0);

        let outcome = f.dispatcher.run_cycle().await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Dispatched { matched: 0, .. }));
        assert!(f.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_renotifies_every_cycle_while_satisfied() {
        let f = fixture().await;
        f.db.upsert_subscription("A", 20).await.unwrap();
        publish(&f.cell, 1, 25, 2000.0);

        f.dispatcher.run_cycle().await.unwrap();
        f.dispatcher.run_cycle().await.unwrap();

        let sent = f.sink.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(id, _)| id == "A"));
    }

    #[tokio::test]
    async fn test_only_matching_subscribers_notified() {
        let f = fixture().await;
        for (id, threshold) in [("low", 10), ("exact", 25), ("high", 30)] {
            f.db.upsert_subscription(id, threshold).await.unwrap();
        }
        publish(&f.cell, 1, 25, 2000.0);

        f.dispatcher.run_cycle().await.unwrap();

        let ids: Vec<String> = f.sink.sent().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["exact", "low"]);
    }

    #[tokio::test]
    async fn test_reads_latest_snapshot() {
        let f = fixture().await;
        f.db.upsert_subscription("A", 20).await.unwrap();

        publish(&f.cell, 1, 15, 2000.0);
        f.dispatcher.run_cycle().await.unwrap();
        assert!(f.sink.sent().is_empty());

        publish(&f.cell, 2, 22, 2000.0);
        let outcome = f.dispatcher.run_cycle().await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dispatched { sequence: 2, delivered: 1, .. }));
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_others() {
        let f = fixture_with_sink(RecordingSink::rejecting("broken")).await;
        for id in ["broken", "ok1", "ok2"] {
            f.db.upsert_subscription(id, 10).await.unwrap();
        }
        publish(&f.cell, 1, 25, 2000.0);

        let outcome = f.dispatcher.run_cycle().await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched {
                sequence: 1,
                rate_gwei: 25,
                matched: 3,
                delivered: 2,
                failed: 1,
            }
        );
        let ids: Vec<String> = f.sink.sent().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["ok1", "ok2"]);
    }

    #[tokio::test]
    async fn test_rate_at_or_below_configuration() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let cell = SnapshotCell::new();
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(
            db.clone(),
            cell.reader(),
            sink.clone(),
            DispatcherConfig {
                tier: TierKind::Average,
                comparison: Comparison::RateAtOrBelow,
            },
        );
        db.upsert_subscription("cheap", 20).await.unwrap();
        db.upsert_subscription("cheaper", 10).await.unwrap();
        publish(&cell, 1, 15, 2000.0);

        dispatcher.run_cycle().await.unwrap();

        let ids: Vec<String> = sink.sent().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["cheap"]);
    }
}
