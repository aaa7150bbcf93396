//! Planned trades.

use crate::domain::{Decimal, Symbol};
use serde::{Deserialize, Serialize};

/// One planned trade converting `usd_value` worth of `from` into `to`.
///
/// Amounts are in each asset's whole units and are always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPair {
    pub from: Symbol,
    pub to: Symbol,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub usd_value: Decimal,
}

/// Ordered swaps plus the snapshot total they were computed against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePlan {
    pub swaps: Vec<SwapPair>,
    pub total_value: Decimal,
}

impl RebalancePlan {
    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    /// Total USD moved by the plan.
    pub fn usd_volume(&self) -> Decimal {
        self.swaps.iter().map(|s| s.usd_value).sum()
    }
}
