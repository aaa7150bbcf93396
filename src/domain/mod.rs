//! Domain types for the portfolio rebalancer.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: Symbol, Address, ChainId
//! - Token-list metadata, balances and priced assets
//! - Planned swaps and the transaction records produced when they execute

pub mod asset;
pub mod decimal;
pub mod primitives;
pub mod swap;
pub mod token;
pub mod transaction;

pub use asset::{Asset, AssetBalance};
pub use decimal::Decimal;
pub use primitives::{Address, AddressParseError, ChainId, Symbol};
pub use swap::{RebalancePlan, SwapPair};
pub use token::{TokenInfo, TokenList, TokenListVersion};
pub use transaction::{Transaction, TxStatus};
