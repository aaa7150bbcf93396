//! External collaborators: balances, prices, token metadata and swap
//! execution.

use crate::domain::{Address, Asset, AssetBalance, Decimal, Symbol, TokenInfo, TokenList};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub mod coingecko;
pub mod mock;
pub mod rpc;
pub mod simulated;
pub mod token_list;

pub use coingecko::CoinGeckoPriceSource;
pub use mock::{
    MockBalanceSource, MockPriceSource, MockSwapVenue, MockTokenListSource, RecordedSwap,
};
pub use rpc::RpcBalanceSource;
pub use simulated::SimulatedSwapVenue;
pub use token_list::{HttpTokenListSource, TokenRepository};

/// Reads on-chain balances for a wallet.
#[async_trait]
pub trait BalanceSource: Send + Sync + fmt::Debug {
    /// Fetch the balance of every token in `tokens` held by `owner`.
    ///
    /// # Returns
    /// One balance per token, in `tokens` order. Tokens whose balance does
    /// not fit a `Decimal` are left out.
    async fn get_all_balances(
        &self,
        owner: &Address,
        tokens: &[TokenInfo],
    ) -> Result<Vec<AssetBalance>, DataSourceError>;
}

/// USD price feed.
#[async_trait]
pub trait PriceSource: Send + Sync + fmt::Debug {
    /// Fetch USD prices for `symbols`. Symbols the feed does not know are
    /// absent from the result.
    async fn get_prices(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Decimal>, DataSourceError>;
}

/// Executes a single swap on some venue.
#[async_trait]
pub trait SwapVenue: Send + Sync + fmt::Debug {
    /// Swap `from_amount` of `from` into `to_amount` of `to`.
    ///
    /// # Returns
    /// `Ok(true)` when the swap settled, `Ok(false)` when the venue declined
    /// it. Errors also count as failure.
    async fn execute_swap(
        &self,
        from: &Asset,
        to: &Asset,
        from_amount: Decimal,
        to_amount: Decimal,
        usd_value: Decimal,
    ) -> Result<bool, DataSourceError>;
}

/// Retrieves a published token list.
#[async_trait]
pub trait TokenListSource: Send + Sync + fmt::Debug {
    async fn fetch_token_list(&self) -> Result<TokenList, DataSourceError>;
}

/// Error type for collaborator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// JSON-RPC error object returned by a node
    RpcError { code: i64, message: String },
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

/// Map an HTTP status to a retry decision the way every HTTP source here does:
/// 429 and 5xx are transient, other non-success codes are permanent.
pub(crate) fn classify_status(
    status: reqwest::StatusCode,
) -> Result<(), backoff::Error<DataSourceError>> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(backoff::Error::transient(DataSourceError::RateLimited));
    }
    if status.is_server_error() {
        return Err(backoff::Error::transient(DataSourceError::HttpError {
            status: status.as_u16(),
            message: "Server error".to_string(),
        }));
    }
    if !status.is_success() {
        return Err(backoff::Error::permanent(DataSourceError::HttpError {
            status: status.as_u16(),
            message: "Client error".to_string(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = DataSourceError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = DataSourceError::RpcError {
            code: -32000,
            message: "execution reverted".to_string(),
        };
        assert_eq!(err.to_string(), "RPC error -32000: execution reverted");

        assert_eq!(DataSourceError::RateLimited.to_string(), "Rate limited");
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(reqwest::StatusCode::OK).is_ok());

        match classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            Err(backoff::Error::Transient { err, .. }) => {
                assert_eq!(err, DataSourceError::RateLimited)
            }
            other => panic!("Expected transient rate limit, got {other:?}"),
        }

        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_GATEWAY),
            Err(backoff::Error::Transient { .. })
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::NOT_FOUND),
            Err(backoff::Error::Permanent(DataSourceError::HttpError { status: 404, .. }))
        ));
    }
}
