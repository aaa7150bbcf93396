//! Append-only record of swap attempts, newest first.

use crate::domain::{Transaction, TxStatus};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Ledger shared between the executor (writer) and readers such as the API.
pub type SharedLedger = Arc<RwLock<TransactionLedger>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown transaction {0}")]
    UnknownTransaction(Uuid),
    #[error("transaction {id} cannot move from {from} to {to}")]
    InvalidTransition { id: Uuid, from: TxStatus, to: TxStatus },
    #[error("transaction {0} must be created pending")]
    NotPending(Uuid),
    #[error("transaction {0} already recorded")]
    Duplicate(Uuid),
}

#[derive(Debug, Default)]
pub struct TransactionLedger {
    entries: VecDeque<Transaction>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLedger {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Record a new pending transaction at the front of the ledger.
    pub fn append(&mut self, tx: Transaction) -> Result<Uuid, LedgerError> {
        if tx.status != TxStatus::Pending {
            return Err(LedgerError::NotPending(tx.id));
        }
        if self.get(tx.id).is_some() {
            return Err(LedgerError::Duplicate(tx.id));
        }
        let id = tx.id;
        self.entries.push_front(tx);
        Ok(id)
    }

    /// Move a pending transaction to a terminal state.
    pub fn update_status(&mut self, id: Uuid, status: TxStatus) -> Result<(), LedgerError> {
        let tx = self
            .entries
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(LedgerError::UnknownTransaction(id))?;

        if !tx.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                id,
                from: tx.status,
                to: status,
            });
        }
        tx.status = status;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&Transaction> {
        self.entries.iter().find(|t| t.id == id)
    }

    /// Newest first.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Transaction> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
