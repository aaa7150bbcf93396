//! Sequential execution of a rebalance plan.
//!
//! Swaps run strictly one at a time, in plan order. Each one is recorded in
//! the ledger as pending before the venue is called and settled to completed
//! or failed afterwards. The first failure aborts the rest of the plan;
//! swaps that already settled stay settled.

use crate::datasource::SwapVenue;
use crate::domain::{Asset, Decimal, RebalancePlan, SwapPair, Symbol, Transaction, TxStatus};
use crate::engine::allocation;
use crate::engine::ledger::SharedLedger;
use crate::error::RebalanceError;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Where a plan run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ExecutionState {
    Idle,
    /// Swap `index` is in flight.
    Running { index: usize },
    /// Swap `index` failed; later swaps were never attempted.
    Aborted { index: usize },
    Done,
}

/// Result of a single swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Settled,
    Failed,
}

impl ExecutionState {
    /// Leave `Idle` for a plan of `plan_len` swaps.
    pub fn start(self, plan_len: usize) -> Self {
        match self {
            ExecutionState::Idle if plan_len == 0 => ExecutionState::Done,
            ExecutionState::Idle => ExecutionState::Running { index: 0 },
            other => other,
        }
    }

    /// Transition on the outcome of the running swap. Non-running states
    /// ignore outcomes.
    pub fn advance(self, outcome: SwapOutcome, plan_len: usize) -> Self {
        match (self, outcome) {
            (ExecutionState::Running { index }, SwapOutcome::Settled) if index + 1 < plan_len => {
                ExecutionState::Running { index: index + 1 }
            }
            (ExecutionState::Running { .. }, SwapOutcome::Settled) => ExecutionState::Done,
            (ExecutionState::Running { index }, SwapOutcome::Failed) => {
                ExecutionState::Aborted { index }
            }
            (other, _) => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Done | ExecutionState::Aborted { .. })
    }
}

/// What a plan run left behind.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Snapshot after every settled swap, percentages recomputed and targets
    /// reset. Partially rebalanced when the run aborted.
    pub assets: Vec<Asset>,
    pub state: ExecutionState,
    /// Number of swaps that settled.
    pub completed: usize,
    /// The swap failure that aborted the run, if any.
    pub failure: Option<RebalanceError>,
}

impl ExecutionOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == ExecutionState::Done
    }
}

/// Drives a [`RebalancePlan`] against a [`SwapVenue`].
#[derive(Debug)]
pub struct SwapExecutor {
    venue: Arc<dyn SwapVenue>,
    stablecoins: HashSet<Symbol>,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SwapExecutor {
    /// `stablecoins` are credited with the swap's USD value rather than the
    /// quoted token amount.
    pub fn new(venue: Arc<dyn SwapVenue>, stablecoins: HashSet<Symbol>) -> Self {
        Self {
            venue,
            stablecoins,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_executing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run `plan` against `snapshot`, recording every attempt in `ledger`.
    ///
    /// # Errors
    /// `AlreadyExecuting` when another run is in flight. A swap failure is
    /// not an `Err`: it is reported in [`ExecutionOutcome::failure`] together
    /// with the partially rebalanced snapshot.
    pub async fn execute(
        &self,
        plan: &RebalancePlan,
        mut snapshot: Vec<Asset>,
        ledger: &SharedLedger,
    ) -> Result<ExecutionOutcome, RebalanceError> {
        let _guard = self.acquire()?;

        let total = plan.len();
        info!(
            "Executing rebalance: {} swaps, {} USD against a {} USD portfolio",
            total,
            plan.usd_volume(),
            plan.total_value
        );

        let mut state = ExecutionState::Idle.start(total);
        let mut completed = 0;
        let mut failure = None;

        while let ExecutionState::Running { index } = state {
            let swap = &plan.swaps[index];
            info!(
                "[{}/{}] {} {} -> {} {} ({} USD)",
                index + 1,
                total,
                swap.from_amount,
                swap.from,
                swap.to_amount,
                swap.to,
                swap.usd_value
            );

            let outcome = match self.execute_one(swap, &mut snapshot, ledger).await {
                Ok(()) => {
                    completed += 1;
                    SwapOutcome::Settled
                }
                Err(err) => {
                    warn!("Aborting rebalance at swap {}/{}: {}", index + 1, total, err);
                    failure = Some(err);
                    SwapOutcome::Failed
                }
            };
            state = state.advance(outcome, total);
        }

        allocation::recompute_percentages(&mut snapshot);
        for asset in snapshot.iter_mut() {
            asset.rebalancing_target = Some(Decimal::zero());
        }

        info!(
            "Rebalance finished: {}/{} swaps settled ({:?})",
            completed, total, state
        );

        Ok(ExecutionOutcome {
            assets: snapshot,
            state,
            completed,
            failure,
        })
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>, RebalanceError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RebalanceError::AlreadyExecuting)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    async fn execute_one(
        &self,
        swap: &SwapPair,
        snapshot: &mut [Asset],
        ledger: &SharedLedger,
    ) -> Result<(), RebalanceError> {
        let tx = Transaction::pending(swap);
        let tx_id = ledger.write().await.append(tx)?;

        let fail = |reason: String| RebalanceError::SwapExecution {
            transaction_id: tx_id,
            from: swap.from.clone(),
            to: swap.to.clone(),
            from_amount: swap.from_amount,
            to_amount: swap.to_amount,
            usd_value: swap.usd_value,
            reason,
        };

        let (Some(from_idx), Some(to_idx)) = (
            position(snapshot, &swap.from),
            position(snapshot, &swap.to),
        ) else {
            ledger.write().await.update_status(tx_id, TxStatus::Failed)?;
            return Err(fail("asset missing from snapshot".to_string()));
        };

        let result = self
            .venue
            .execute_swap(
                &snapshot[from_idx],
                &snapshot[to_idx],
                swap.from_amount,
                swap.to_amount,
                swap.usd_value,
            )
            .await;

        let reason = match result {
            Ok(true) => {
                ledger
                    .write()
                    .await
                    .update_status(tx_id, TxStatus::Completed)?;
                self.settle(swap, snapshot, from_idx, to_idx);
                return Ok(());
            }
            Ok(false) => "venue declined the swap".to_string(),
            Err(err) => err.to_string(),
        };

        ledger.write().await.update_status(tx_id, TxStatus::Failed)?;
        Err(fail(reason))
    }

    /// Book a settled swap into the snapshot. Stablecoin destinations are
    /// credited one unit per USD.
    fn settle(&self, swap: &SwapPair, snapshot: &mut [Asset], from_idx: usize, to_idx: usize) {
        let seller = &mut snapshot[from_idx];
        let remaining = seller.formatted_amount - swap.from_amount;
        seller.set_formatted_amount(remaining);
        seller.usd_value = (seller.usd_value - swap.usd_value).max(Decimal::zero());

        let buyer = &mut snapshot[to_idx];
        let credit = if self.stablecoins.contains(&buyer.symbol) {
            swap.usd_value
        } else {
            swap.to_amount
        };
        let received = buyer.formatted_amount + credit;
        buyer.set_formatted_amount(received);
        buyer.usd_value += swap.usd_value;
    }
}

fn position(snapshot: &[Asset], symbol: &Symbol) -> Option<usize> {
    snapshot.iter().position(|a| &a.symbol == symbol)
}
