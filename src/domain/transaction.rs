//! Ledger entries for swap attempts.

use crate::domain::{Decimal, SwapPair, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a swap attempt: `pending` moves to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        matches!(
            (self, next),
            (TxStatus::Pending, TxStatus::Completed) | (TxStatus::Pending, TxStatus::Failed)
        )
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "pending"),
            TxStatus::Completed => write!(f, "completed"),
            TxStatus::Failed => write!(f, "failed"),
        }
    }
}

/// An executed (or attempted) swap. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub from_symbol: Symbol,
    pub to_symbol: Symbol,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub usd_value: Decimal,
    pub status: TxStatus,
}

impl Transaction {
    /// A new pending entry for `swap`, stamped now.
    pub fn pending(swap: &SwapPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            from_symbol: swap.from.clone(),
            to_symbol: swap.to.clone(),
            from_amount: swap.from_amount,
            to_amount: swap.to_amount,
            usd_value: swap.usd_value,
            status: TxStatus::Pending,
        }
    }
}
