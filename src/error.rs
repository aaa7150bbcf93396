use crate::datasource::DataSourceError;
use crate::domain::{Decimal, Symbol};
use crate::engine::ledger::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Which external collaborator a fetch failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Balances,
    Prices,
    Tokens,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Balances => write!(f, "balances"),
            SourceKind::Prices => write!(f, "prices"),
            SourceKind::Tokens => write!(f, "token list"),
        }
    }
}

/// Errors raised by the rebalancing engine and the session driving it.
#[derive(Debug, Error)]
pub enum RebalanceError {
    /// Targets do not sum to 100 within tolerance. Correctable by the user.
    #[error("target allocation sums to {sum}%, expected 100%")]
    Validation { sum: Decimal },

    #[error("target for {symbol} must be between 0 and 100, got {target}")]
    TargetOutOfRange { symbol: Symbol, target: Decimal },

    #[error("unknown asset: {0}")]
    UnknownAsset(Symbol),

    /// Balance, price or token-list retrieval failed. Previous data is kept.
    #[error("failed to fetch {kind}: {error}")]
    SourceFetch {
        kind: SourceKind,
        #[source]
        error: DataSourceError,
    },

    /// A swap failed; the rest of the plan was abandoned and earlier swaps
    /// were not rolled back.
    #[error(
        "swap {from_amount} {from} -> {to_amount} {to} (${usd_value}) failed: {reason}"
    )]
    SwapExecution {
        transaction_id: Uuid,
        from: Symbol,
        to: Symbol,
        from_amount: Decimal,
        to_amount: Decimal,
        usd_value: Decimal,
        reason: String,
    },

    #[error("a rebalance is already executing")]
    AlreadyExecuting,

    #[error("no rebalance in progress")]
    NotRebalancing,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The background task running a plan panicked or was torn down.
    #[error("rebalance task failed: {0}")]
    ExecutionTask(String),
}

impl RebalanceError {
    pub fn source_fetch(kind: SourceKind, error: DataSourceError) -> Self {
        RebalanceError::SourceFetch { kind, error }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl From<RebalanceError> for AppError {
    fn from(err: RebalanceError) -> Self {
        let msg = err.to_string();
        match err {
            RebalanceError::Validation { .. }
            | RebalanceError::TargetOutOfRange { .. }
            | RebalanceError::UnknownAsset(_) => AppError::BadRequest(msg),
            RebalanceError::AlreadyExecuting | RebalanceError::NotRebalancing => {
                AppError::Conflict(msg)
            }
            RebalanceError::SourceFetch { .. } | RebalanceError::SwapExecution { .. } => {
                AppError::Upstream(msg)
            }
            RebalanceError::Ledger(_) | RebalanceError::ExecutionTask(_) => {
                AppError::Internal(msg)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_is_bad_request() {
        let err: AppError = RebalanceError::Validation {
            sum: Decimal::from(90),
        }
        .into();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("90%")));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_source_fetch_is_bad_gateway() {
        let err: AppError = RebalanceError::source_fetch(
            SourceKind::Prices,
            DataSourceError::RateLimited,
        )
        .into();
        assert_eq!(err.to_string(), "Upstream error: failed to fetch prices: Rate limited");
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_already_executing_is_conflict() {
        let err: AppError = RebalanceError::AlreadyExecuting.into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_execution_task_failure_is_internal() {
        let err: AppError = RebalanceError::ExecutionTask("task panicked".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_swap_error_carries_context() {
        let err = RebalanceError::SwapExecution {
            transaction_id: Uuid::nil(),
            from: Symbol::new("ONE"),
            to: Symbol::new("1USDT"),
            from_amount: Decimal::from(2000),
            to_amount: Decimal::from(20),
            usd_value: Decimal::from(20),
            reason: "reverted".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "swap 2000 ONE -> 20 1USDT ($20) failed: reverted"
        );
    }
}
