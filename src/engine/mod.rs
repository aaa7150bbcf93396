//! Pure rebalancing computation plus the sequential swap executor.

pub mod allocation;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod validator;

pub use allocation::{annotate, carry_targets, recompute_percentages, total_value};
pub use executor::{ExecutionOutcome, ExecutionState, SwapExecutor, SwapOutcome};
pub use ledger::{LedgerError, SharedLedger, TransactionLedger};
pub use planner::{build_plan, plan};
pub use validator::{check_target_range, ensure_valid, tolerance, validate, TargetValidation};
