//! Gas price data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gwei per ETH.
pub const GWEI_PER_ETH: u64 = 1_000_000_000;

/// Gas consumed by a plain ETH transfer.
pub const TRANSFER_GAS_UNITS: u64 = 21_000;

/// Convert a gas price in gwei to the USD cost of a plain transfer.
///
/// `rate_gwei / GWEI_PER_ETH * TRANSFER_GAS_UNITS * usd_per_eth`
pub fn fee_cost_usd(rate_gwei: u64, usd_per_eth: f64) -> f64 {
    rate_gwei as f64 / GWEI_PER_ETH as f64 * TRANSFER_GAS_UNITS as f64 * usd_per_eth
}

/// Named fee tier as reported by the gas oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TierKind {
    Slow = 0,
    Average = 1,
    Fast = 2,
}

impl TierKind {
    /// All tiers in display order.
    pub const ALL: [TierKind; 3] = [TierKind::Slow, TierKind::Average, TierKind::Fast];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            TierKind::Slow => "Slow",
            TierKind::Average => "Average",
            TierKind::Fast => "Fast",
        }
    }
}

/// Raw fee rates in gwei, one per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    pub slow: u64,
    pub average: u64,
    pub fast: u64,
}

impl FeeRates {
    pub fn new(slow: u64, average: u64, fast: u64) -> Self {
        Self { slow, average, fast }
    }

    /// Rate for a single tier.
    pub fn rate(&self, kind: TierKind) -> u64 {
        match kind {
            TierKind::Slow => self.slow,
            TierKind::Average => self.average,
            TierKind::Fast => self.fast,
        }
    }
}

/// A single tier with its derived USD cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeTier {
    pub kind: TierKind,
    /// Gas price in gwei.
    pub rate_gwei: u64,
    /// Cost of a plain transfer at this rate, in USD.
    pub cost_usd: f64,
}

impl FeeTier {
    pub fn new(kind: TierKind, rate_gwei: u64, usd_per_eth: f64) -> Self {
        Self {
            kind,
            rate_gwei,
            cost_usd: fee_cost_usd(rate_gwei, usd_per_eth),
        }
    }
}

/// Immutable, fully populated record of the latest fetched prices.
///
/// Snapshots are replaced wholesale; there is no way to build one with a
/// missing tier or a missing ETH price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    sequence: u64,
    usd_per_eth: f64,
    tiers: [FeeTier; 3],
    fetched_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Derive a snapshot from raw oracle values.
    pub fn derive(
        sequence: u64,
        rates: FeeRates,
        usd_per_eth: f64,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let tiers = TierKind::ALL.map(|kind| FeeTier::new(kind, rates.rate(kind), usd_per_eth));
        Self {
            sequence,
            usd_per_eth,
            tiers,
            fetched_at,
        }
    }

    /// Poll cycle that produced this snapshot.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// ETH price in USD.
    #[inline]
    pub fn usd_per_eth(&self) -> f64 {
        self.usd_per_eth
    }

    #[inline]
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// All tiers ordered slow, average, fast.
    #[inline]
    pub fn tiers(&self) -> &[FeeTier; 3] {
        &self.tiers
    }

    #[inline]
    pub fn tier(&self, kind: TierKind) -> &FeeTier {
        &self.tiers[kind.index()]
    }

    #[inline]
    pub fn average(&self) -> &FeeTier {
        self.tier(TierKind::Average)
    }

    /// Raw rates this snapshot was derived from.
    pub fn rates(&self) -> FeeRates {
        FeeRates::new(
            self.tier(TierKind::Slow).rate_gwei,
            self.tier(TierKind::Average).rate_gwei,
            self.tier(TierKind::Fast).rate_gwei,
        )
    }
}
