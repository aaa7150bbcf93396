//! Portfolio holdings: raw balances from the chain and priced assets.

use crate::domain::{Address, ChainId, Decimal, Symbol, TokenInfo};
use serde::{Deserialize, Serialize};

/// A balance as reported by a [`crate::datasource::BalanceSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub symbol: Symbol,
    /// Integer amount in base units.
    pub raw_amount: u128,
    /// `raw_amount / 10^decimals`.
    pub formatted_amount: Decimal,
    pub decimals: u32,
    pub address: Address,
    pub chain_id: ChainId,
}

impl AssetBalance {
    /// Build a balance from a base-unit reading for `token`.
    pub fn from_raw(token: &TokenInfo, raw_amount: u128) -> Result<Self, rust_decimal::Error> {
        Ok(Self {
            symbol: token.symbol.clone(),
            raw_amount,
            formatted_amount: Decimal::from_base_units(raw_amount, token.decimals)?,
            decimals: token.decimals,
            address: token.address.clone(),
            chain_id: token.chain_id,
        })
    }
}

/// One fungible holding annotated with price and allocation data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub symbol: Symbol,
    pub address: Address,
    pub chain_id: ChainId,
    pub decimals: u32,
    pub raw_amount: u128,
    pub formatted_amount: Decimal,
    /// USD per unit; zero means unpriced.
    pub price: Decimal,
    pub usd_value: Decimal,
    /// Share of total portfolio USD value, 0–100.
    pub portfolio_percentage: Decimal,
    /// User-declared target share, 0–100. Absent counts as zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebalancing_target: Option<Decimal>,
}

impl Asset {
    /// Price a balance. `portfolio_percentage` is left at zero until the
    /// whole snapshot is known. A holding whose USD value does not fit a
    /// `Decimal` is left unpriced.
    pub fn from_balance(balance: &AssetBalance, price: Decimal) -> Self {
        let (price, usd_value) = match balance.formatted_amount.checked_mul(price) {
            Some(usd_value) => (price, usd_value),
            None => (Decimal::zero(), Decimal::zero()),
        };
        Self {
            symbol: balance.symbol.clone(),
            address: balance.address.clone(),
            chain_id: balance.chain_id,
            decimals: balance.decimals,
            raw_amount: balance.raw_amount,
            formatted_amount: balance.formatted_amount,
            price,
            usd_value,
            portfolio_percentage: Decimal::zero(),
            rebalancing_target: None,
        }
    }

    pub fn target_or_zero(&self) -> Decimal {
        self.rebalancing_target.unwrap_or_default()
    }

    pub fn has_value(&self) -> bool {
        self.usd_value.is_positive()
    }

    /// The holding as a plain balance, dropping price and allocation data.
    pub fn to_balance(&self) -> AssetBalance {
        AssetBalance {
            symbol: self.symbol.clone(),
            raw_amount: self.raw_amount,
            formatted_amount: self.formatted_amount,
            decimals: self.decimals,
            address: self.address.clone(),
            chain_id: self.chain_id,
        }
    }

    /// Set the whole-unit amount and keep `raw_amount` in step.
    pub fn set_formatted_amount(&mut self, amount: Decimal) {
        let amount = amount.max(Decimal::zero());
        self.formatted_amount = amount;
        self.raw_amount = amount.to_base_units(self.decimals).unwrap_or(self.raw_amount);
    }
}
