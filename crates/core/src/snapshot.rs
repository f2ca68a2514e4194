//! Process-wide holder for the latest [`PriceSnapshot`].
//!
//! The poller owns the only [`SnapshotCell`]; every other component holds a
//! cheap, cloneable [`SnapshotReader`]. Publication swaps an
//! `Arc<PriceSnapshot>` inside a `watch` channel, so a reader observes either
//! the previous snapshot or the new one, never a mix of both.

use crate::PriceSnapshot;
use std::sync::Arc;
use tokio::sync::watch;

type Slot = Option<Arc<PriceSnapshot>>;

/// Single-writer side of the snapshot channel.
#[derive(Debug)]
pub struct SnapshotCell {
    tx: watch::Sender<Slot>,
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCell {
    /// Create an empty cell (no snapshot published yet).
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish a snapshot.
    ///
    /// Returns `false` and keeps the current value when `snapshot` is not
    /// newer than what is already published, so a slow cycle finishing late
    /// can't overwrite a fresher result.
    pub fn publish(&self, snapshot: PriceSnapshot) -> bool {
        self.tx.send_if_modified(move |slot| {
            if let Some(current) = slot {
                if current.sequence() >= snapshot.sequence() {
                    return false;
                }
            }
            *slot = Some(Arc::new(snapshot));
            true
        })
    }

    /// Latest published snapshot, if any.
    pub fn current(&self) -> Option<Arc<PriceSnapshot>> {
        self.tx.borrow().clone()
    }

    /// Create a read handle.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only handle onto the latest snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Slot>,
}

impl SnapshotReader {
    /// Latest published snapshot, or `None` before the first successful poll.
    pub fn current(&self) -> Option<Arc<PriceSnapshot>> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeeRates;
    use chrono::Utc;

    fn snapshot(sequence: u64, average: u64) -> PriceSnapshot {
        PriceSnapshot::derive(sequence, FeeRates::new(1, average, 100), 2000.0, Utc::now())
    }

    #[test]
    fn test_empty_cell() {
        let cell = SnapshotCell::new();
        assert!(cell.current().is_none());
        assert!(cell.reader().current().is_none());
    }

    #[test]
    fn test_publish_visible_to_readers() {
        let cell = SnapshotCell::new();
        let reader = cell.reader();

        assert!(cell.publish(snapshot(1, 20)));

        let seen = reader.current().expect("snapshot published");
        assert_eq!(seen.sequence(), 1);
        assert_eq!(seen.average().rate_gwei, 20);
    }

    #[test]
    fn test_newer_snapshot_replaces_older() {
        let cell = SnapshotCell::new();
        let reader = cell.reader();

        assert!(cell.publish(snapshot(1, 20)));
        assert!(cell.publish(snapshot(2, 30)));

        assert_eq!(reader.current().unwrap().average().rate_gwei, 30);
    }

    #[test]
    fn test_stale_snapshot_rejected() {
        let cell = SnapshotCell::new();
        let reader = cell.reader();

        assert!(cell.publish(snapshot(5, 20)));
        assert!(!cell.publish(snapshot(4, 99)));
        assert!(!cell.publish(snapshot(5, 99)));

        let seen = reader.current().unwrap();
        assert_eq!(seen.sequence(), 5);
        assert_eq!(seen.average().rate_gwei, 20);
    }

    #[test]
    fn test_reader_keeps_old_arc_after_swap() {
        let cell = SnapshotCell::new();
        let reader = cell.reader();

        cell.publish(snapshot(1, 20));
        let held = reader.current().unwrap();
        cell.publish(snapshot(2, 30));

        // A reader that started before publication keeps a complete old value.
        assert_eq!(held.average().rate_gwei, 20);
        assert_eq!(reader.current().unwrap().average().rate_gwei, 30);
    }
}
