//! Token-list metadata (Uniswap token-list JSON shape).

use crate::domain::{Address, ChainId, Symbol};
use serde::{Deserialize, Serialize};

/// Metadata for a single token on a single chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub chain_id: ChainId,
    pub address: Address,
    pub symbol: Symbol,
    pub name: String,
    pub decimals: u32,
    #[serde(rename = "logoURI", default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

impl TokenInfo {
    pub fn is_native(&self) -> bool {
        self.address.is_native()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// A published token list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenList {
    pub name: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub version: Option<TokenListVersion>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(rename = "logoURI", default)]
    pub logo_uri: Option<String>,
    pub tokens: Vec<TokenInfo>,
}

impl TokenList {
    /// Tokens deployed on `chain_id`, in list order.
    pub fn tokens_for_chain(&self, chain_id: ChainId) -> Vec<TokenInfo> {
        self.tokens
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect()
    }
}
