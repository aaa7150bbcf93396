pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    BalanceSource, DataSourceError, PriceSource, SwapVenue, TokenListSource, TokenRepository,
};
pub use domain::{
    Address, Asset, AssetBalance, ChainId, Decimal, RebalancePlan, SwapPair, Symbol, TokenInfo,
    Transaction, TxStatus,
};
pub use error::{AppError, RebalanceError};
pub use orchestration::RebalanceSession;
