use crate::domain::{Address, ChainId, Symbol};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_TOKEN_LIST_URL: &str =
    "https://raw.githubusercontent.com/harmony-one/swap-token-list/main/tokenlist.json";
const DEFAULT_PRICE_IDS: &str = "ONE=harmony,USDT=tether,1USDT=tether,BTC=bitcoin,1WBTC=bitcoin";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub wallet_address: Address,
    pub rpc_url: String,
    pub chain_id: ChainId,
    pub price_api_url: String,
    pub token_list_url: String,
    pub token_list_ttl: Duration,
    pub price_refresh_interval: Duration,
    pub supported_symbols: Vec<Symbol>,
    pub stablecoins: Vec<Symbol>,
    pub price_ids: HashMap<Symbol, String>,
    pub native_symbol: Symbol,
    pub native_decimals: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let wallet_address = required(&env_map, "WALLET_ADDRESS")?;
        let wallet_address = Address::parse(&wallet_address)
            .map_err(|e| ConfigError::InvalidValue("WALLET_ADDRESS".to_string(), e.to_string()))?;

        let rpc_url = required(&env_map, "RPC_URL")?;

        let chain_id = ChainId(parse_or(
            &env_map,
            "CHAIN_ID",
            1666600000u64,
            "must be a valid u64",
        )?);

        let price_api_url = env_map
            .get("PRICE_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string());

        let token_list_url = env_map
            .get("TOKEN_LIST_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOKEN_LIST_URL.to_string());

        let token_list_ttl = Duration::from_secs(parse_or(
            &env_map,
            "TOKEN_LIST_TTL_SECS",
            300u64,
            "must be a number of seconds",
        )?);

        let price_refresh_secs: u64 = parse_or(
            &env_map,
            "PRICE_REFRESH_SECS",
            120u64,
            "must be a number of seconds",
        )?;
        if price_refresh_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PRICE_REFRESH_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let supported_symbols = parse_symbols(
            env_map
                .get("SUPPORTED_SYMBOLS")
                .map(|s| s.as_str())
                .unwrap_or("ONE,1USDT,1WBTC"),
        );
        if supported_symbols.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SUPPORTED_SYMBOLS".to_string(),
                "must name at least one symbol".to_string(),
            ));
        }

        let stablecoins = parse_symbols(
            env_map
                .get("STABLECOINS")
                .map(|s| s.as_str())
                .unwrap_or("1USDT,USDT,USDC"),
        );

        let price_ids = parse_price_ids(
            env_map
                .get("PRICE_IDS")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_PRICE_IDS),
        )?;

        let native_symbol = Symbol::new(
            env_map
                .get("NATIVE_SYMBOL")
                .map(|s| s.trim())
                .unwrap_or("ONE"),
        );

        let native_decimals = parse_or(&env_map, "NATIVE_DECIMALS", 18u32, "must be a valid u32")?;
        if native_decimals > 28 {
            return Err(ConfigError::InvalidValue(
                "NATIVE_DECIMALS".to_string(),
                "must be at most 28".to_string(),
            ));
        }

        Ok(Config {
            port,
            wallet_address,
            rpc_url,
            chain_id,
            price_api_url,
            token_list_url,
            token_list_ttl,
            price_refresh_interval: Duration::from_secs(price_refresh_secs),
            supported_symbols,
            stablecoins,
            price_ids,
            native_symbol,
            native_decimals,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string())),
        None => Ok(default),
    }
}

fn parse_symbols(value: &str) -> Vec<Symbol> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Symbol::new)
        .collect()
}

/// `SYMBOL=coin-id` pairs separated by commas.
fn parse_price_ids(value: &str) -> Result<HashMap<Symbol, String>, ConfigError> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((symbol, id)) if !symbol.trim().is_empty() && !id.trim().is_empty() => {
                Ok((Symbol::new(symbol.trim()), id.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue(
                "PRICE_IDS".to_string(),
                format!("expected SYMBOL=id, got {}", pair),
            )),
        })
        .collect()
}
