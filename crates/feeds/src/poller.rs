//! Periodic gas price poller.
//!
//! One cycle fetches the fee tiers and the ETH price concurrently, derives the
//! USD cost of each tier and publishes a fresh [`PriceSnapshot`]. A failed
//! cycle publishes nothing, so readers keep seeing the last good snapshot.

use crate::error::FeedError;
use crate::oracle::PriceOracle;
use chrono::Utc;
use gasalert_core::{PriceSnapshot, SnapshotCell, SnapshotReader, TierKind};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerState {
    Idle = 0,
    Fetching = 1,
    Publishing = 2,
}

impl PollerState {
    fn from_id(id: u8) -> Self {
        match id {
            1 => PollerState::Fetching,
            2 => PollerState::Publishing,
            _ => PollerState::Idle,
        }
    }
}

/// Configuration for [`PricePoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Upper bound for each oracle call.
    pub fetch_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a completed poll cycle.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// A new snapshot is now visible to readers.
    Published(Arc<PriceSnapshot>),
    /// A newer snapshot was already published; this result was dropped.
    Superseded { sequence: u64 },
}

/// Fetches gas prices and publishes snapshots.
pub struct PricePoller {
    oracle: Arc<dyn PriceOracle>,
    cell: SnapshotCell,
    config: PollerConfig,
    next_sequence: AtomicU64,
    state: AtomicU8,
    in_flight: AtomicU32,
}

impl PricePoller {
    /// Create a poller with an empty snapshot cell.
    pub fn new(oracle: Arc<dyn PriceOracle>, config: PollerConfig) -> Self {
        Self {
            oracle,
            cell: SnapshotCell::new(),
            config,
            next_sequence: AtomicU64::new(0),
            state: AtomicU8::new(PollerState::Idle as u8),
            in_flight: AtomicU32::new(0),
        }
    }

    /// Read handle onto the snapshots this poller publishes.
    pub fn reader(&self) -> SnapshotReader {
        self.cell.reader()
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Option<Arc<PriceSnapshot>> {
        self.cell.current()
    }

    /// Current lifecycle state.
    ///
    /// `Idle` only once no cycle is in flight. With overlapping cycles this is
    /// the phase most recently entered by any of them.
    pub fn state(&self) -> PollerState {
        if self.in_flight.load(Ordering::Acquire) == 0 {
            return PollerState::Idle;
        }
        PollerState::from_id(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PollerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run one fetch-derive-publish cycle.
    pub async fn poll_once(&self) -> Result<PollOutcome, FeedError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let _cycle = CycleGuard::enter(self);

        self.set_state(PollerState::Fetching);
        let (rates, usd_per_eth) = tokio::try_join!(
            self.bounded(self.oracle.fetch_fee_tiers()),
            self.bounded(self.oracle.fetch_usd_price()),
        )
        .map_err(|e| {
            warn!("Gas price cycle #{} failed ({}): {}", sequence, e.kind(), e);
            e
        })?;

        self.set_state(PollerState::Publishing);
        let snapshot = PriceSnapshot::derive(sequence, rates, usd_per_eth, Utc::now());

        if !self.cell.publish(snapshot) {
            debug!("Gas price cycle #{} superseded by a newer snapshot", sequence);
            return Ok(PollOutcome::Superseded { sequence });
        }

        let published = self
            .cell
            .current()
            .filter(|s| s.sequence() == sequence);
        match published {
            Some(snapshot) => {
                debug!(
                    "Gas prices #{}: slow {} / average {} / fast {} gwei | ETH ${:.2} | average cost ${:.2}",
                    sequence,
                    snapshot.tier(TierKind::Slow).rate_gwei,
                    snapshot.tier(TierKind::Average).rate_gwei,
                    snapshot.tier(TierKind::Fast).rate_gwei,
                    snapshot.usd_per_eth(),
                    snapshot.average().cost_usd,
                );
                Ok(PollOutcome::Published(snapshot))
            }
            None => Ok(PollOutcome::Superseded { sequence }),
        }
    }

    /// Apply the fetch timeout to a single oracle call.
    async fn bounded<T>(
        &self,
        fetch: impl Future<Output = Result<T, FeedError>>,
    ) -> Result<T, FeedError> {
        let limit = self.config.fetch_timeout;
        tokio::time::timeout(limit, fetch)
            .await
            .map_err(|_| FeedError::Timeout(limit))?
    }
}

/// Tracks one in-flight cycle; the last cycle to end, however it ends,
/// returns the poller to `Idle`.
struct CycleGuard<'a>(&'a PricePoller);

impl<'a> CycleGuard<'a> {
    fn enter(poller: &'a PricePoller) -> Self {
        poller.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(poller)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.set_state(PollerState::Idle);
        } else {
            // Others are still running and only ever wait while fetching.
            self.0.set_state(PollerState::Fetching);
        }
    }
}
