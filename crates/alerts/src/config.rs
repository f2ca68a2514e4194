//! Alert subscription types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Per-subscriber alert threshold stored in database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Database ID
    pub id: i64,
    /// Subscriber identity (Telegram chat ID)
    pub subscriber_id: String,
    /// Gas price in gwei that triggers the alert
    pub threshold_gwei: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// How the reference rate is compared against stored thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparison {
    /// Rate has risen to or above the threshold (`rate >= threshold`).
    #[default]
    RateAtOrAbove,
    /// Rate has dropped to or below the threshold (`rate <= threshold`).
    RateAtOrBelow,
}

impl Comparison {
    /// SQL predicate on `threshold_gwei` with the rate bound as the parameter.
    pub(crate) fn threshold_predicate(self) -> &'static str {
        match self {
            Comparison::RateAtOrAbove => "threshold_gwei <= ?",
            Comparison::RateAtOrBelow => "threshold_gwei >= ?",
        }
    }

    /// Operator as written in the alert rule (`rate OP threshold`).
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::RateAtOrAbove => ">=",
            Comparison::RateAtOrBelow => "<=",
        }
    }
}
