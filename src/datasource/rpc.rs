//! EVM JSON-RPC balance reader.

use super::{classify_status, BalanceSource, DataSourceError};
use crate::domain::{Address, AssetBalance, TokenInfo};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::future::try_join_all;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// ERC-20 `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Reads native balances with `eth_getBalance` and token balances with an
/// `eth_call` to `balanceOf`. Tokens are queried concurrently.
#[derive(Debug)]
pub struct RpcBalanceSource {
    client: Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl RpcBalanceSource {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let body = retry(backoff, || async {
            let response = self
                .client
                .post(&self.rpc_url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            classify_status(response.status())?;

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await?;

        extract_result(body)
    }

    async fn balance_of(
        &self,
        owner: &Address,
        token: &TokenInfo,
    ) -> Result<Option<AssetBalance>, DataSourceError> {
        let result = if token.is_native() {
            self.call("eth_getBalance", serde_json::json!([owner.as_str(), "latest"]))
                .await?
        } else {
            let data = balance_of_calldata(owner)?;
            self.call(
                "eth_call",
                serde_json::json!([{"to": token.address.as_str(), "data": data}, "latest"]),
            )
            .await?
        };

        let raw = parse_quantity(&result)?;
        debug!("Balance of {} for {}: {} base units", token.symbol, owner, raw);

        Ok(representable_balance(token, raw))
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn get_all_balances(
        &self,
        owner: &Address,
        tokens: &[TokenInfo],
    ) -> Result<Vec<AssetBalance>, DataSourceError> {
        debug!("Fetching {} balances for owner={}", tokens.len(), owner);
        let balances =
            try_join_all(tokens.iter().map(|token| self.balance_of(owner, token))).await?;
        Ok(balances.into_iter().flatten().collect())
    }
}

/// `None`, with a warning, when `raw` does not fit a `Decimal` at the
/// token's precision.
fn representable_balance(token: &TokenInfo, raw: u128) -> Option<AssetBalance> {
    match AssetBalance::from_raw(token, raw) {
        Ok(balance) => Some(balance),
        Err(e) => {
            warn!("Skipping {}: balance {} out of range: {}", token.symbol, raw, e);
            None
        }
    }
}

/// Unwrap a JSON-RPC response envelope.
fn extract_result(body: serde_json::Value) -> Result<serde_json::Value, DataSourceError> {
    if let Some(error) = body.get("error") {
        return Err(DataSourceError::RpcError {
            code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| DataSourceError::ParseError("Missing result field".to_string()))
}

/// `balanceOf(owner)` call data: selector plus the owner left-padded to 32
/// bytes.
fn balance_of_calldata(owner: &Address) -> Result<String, DataSourceError> {
    let bytes = owner
        .to_bytes()
        .map_err(|e| DataSourceError::Other(format!("Invalid owner address {}: {}", owner, e)))?;
    if bytes.len() != 20 {
        return Err(DataSourceError::Other(format!(
            "Invalid owner address {}: expected 20 bytes, got {}",
            owner,
            bytes.len()
        )));
    }
    Ok(format!(
        "0x{}{}{}",
        BALANCE_OF_SELECTOR,
        "0".repeat(24),
        hex::encode(bytes)
    ))
}

/// Decode a hex quantity (`"0x1bc16d674ec80000"`) or a 32-byte word. An empty
/// `"0x"` reads as zero.
fn parse_quantity(value: &serde_json::Value) -> Result<u128, DataSourceError> {
    let text = value
        .as_str()
        .ok_or_else(|| DataSourceError::ParseError(format!("Expected hex string, got {}", value)))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing 0x prefix: {}", text)))?
        .trim_start_matches('0');

    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Err(DataSourceError::ParseError(format!(
            "Quantity exceeds 128 bits: {}",
            text
        )));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid hex quantity {}: {}", text, e)))
}
