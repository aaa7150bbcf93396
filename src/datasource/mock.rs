//! In-memory collaborators for testing without network calls.

use super::{BalanceSource, DataSourceError, PriceSource, SwapVenue, TokenListSource};
use crate::domain::{Address, Asset, AssetBalance, Decimal, Symbol, TokenInfo, TokenList};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Balance source backed by a symbol → base-unit map. Tokens without an
/// entry report zero.
#[derive(Debug, Default)]
pub struct MockBalanceSource {
    balances: Mutex<HashMap<Symbol, u128>>,
    failing: AtomicBool,
}

impl MockBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base-unit balance returned for `symbol`.
    pub fn with_balance(self, symbol: &str, raw_amount: u128) -> Self {
        self.set_balance(symbol, raw_amount);
        self
    }

    pub fn set_balance(&self, symbol: &str, raw_amount: u128) {
        lock(&self.balances).insert(Symbol::new(symbol), raw_amount);
    }

    /// Make every subsequent call fail with a network error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BalanceSource for MockBalanceSource {
    async fn get_all_balances(
        &self,
        _owner: &Address,
        tokens: &[TokenInfo],
    ) -> Result<Vec<AssetBalance>, DataSourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DataSourceError::NetworkError("mock balance failure".to_string()));
        }
        let balances = lock(&self.balances);
        tokens
            .iter()
            .map(|token| {
                let raw = balances.get(&token.symbol).copied().unwrap_or(0);
                AssetBalance::from_raw(token, raw)
                    .map_err(|e| DataSourceError::ParseError(e.to_string()))
            })
            .collect()
    }
}

/// Price source whose quotes can be changed between calls.
#[derive(Debug, Default)]
pub struct MockPriceSource {
    prices: Mutex<HashMap<Symbol, Decimal>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        lock(&self.prices).insert(Symbol::new(symbol), price);
    }

    pub fn remove_price(&self, symbol: &str) {
        lock(&self.prices).remove(&Symbol::new(symbol));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn get_prices(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Decimal>, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DataSourceError::HttpError {
                status: 503,
                message: "mock price failure".to_string(),
            });
        }
        let prices = lock(&self.prices);
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}

/// A swap the mock venue was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSwap {
    pub from: Symbol,
    pub to: Symbol,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub usd_value: Decimal,
}

/// Swap venue that records every call. Calls are numbered from zero; a call
/// can be made to error or to be declined.
#[derive(Debug, Default)]
pub struct MockSwapVenue {
    calls: Mutex<Vec<RecordedSwap>>,
    fail_at: Option<usize>,
    decline_at: Option<usize>,
    delay: Option<Duration>,
}

impl MockSwapVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an error from call number `index`.
    pub fn with_failure_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Return `Ok(false)` from call number `index`.
    pub fn with_decline_at(mut self, index: usize) -> Self {
        self.decline_at = Some(index);
        self
    }

    /// Sleep for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedSwap> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl SwapVenue for MockSwapVenue {
    async fn execute_swap(
        &self,
        from: &Asset,
        to: &Asset,
        from_amount: Decimal,
        to_amount: Decimal,
        usd_value: Decimal,
    ) -> Result<bool, DataSourceError> {
        let index = {
            let mut calls = lock(&self.calls);
            calls.push(RecordedSwap {
                from: from.symbol.clone(),
                to: to.symbol.clone(),
                from_amount,
                to_amount,
                usd_value,
            });
            calls.len() - 1
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_at == Some(index) {
            return Err(DataSourceError::Other(format!("mock swap {} failed", index)));
        }
        Ok(self.decline_at != Some(index))
    }
}

/// Token list source returning a fixed list and counting fetches.
#[derive(Debug)]
pub struct MockTokenListSource {
    list: TokenList,
    fetches: AtomicUsize,
    failing: AtomicBool,
}

impl MockTokenListSource {
    pub fn new(tokens: Vec<TokenInfo>) -> Self {
        Self {
            list: TokenList {
                name: "Mock List".to_string(),
                timestamp: None,
                version: None,
                keywords: Vec::new(),
                logo_uri: None,
                tokens,
            },
            fetches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenListSource for MockTokenListSource {
    async fn fetch_token_list(&self) -> Result<TokenList, DataSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DataSourceError::NetworkError("mock token list failure".to_string()));
        }
        Ok(self.list.clone())
    }
}
