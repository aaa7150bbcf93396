//! CoinGecko simple-price client.

use super::{classify_status, DataSourceError, PriceSource};
use crate::domain::{Decimal, Symbol};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

/// USD prices from `GET {base_url}/simple/price?ids=..&vs_currencies=usd`.
///
/// Symbols are mapped to CoinGecko coin ids; several symbols may share an id
/// (a bridged token and its origin, say).
#[derive(Debug, Clone)]
pub struct CoinGeckoPriceSource {
    client: Client,
    base_url: String,
    price_ids: HashMap<Symbol, String>,
}

impl CoinGeckoPriceSource {
    pub fn new(base_url: String, price_ids: HashMap<Symbol, String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            price_ids,
        }
    }

    async fn fetch_simple_price(&self, ids: &str) -> Result<serde_json::Value, DataSourceError> {
        let url = format!("{}/simple/price", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&[("ids", ids), ("vs_currencies", "usd")])
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
        .await
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    async fn get_prices(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Decimal>, DataSourceError> {
        let mapped: Vec<(Symbol, &str)> = symbols
            .iter()
            .filter_map(|s| match self.price_ids.get(s) {
                Some(id) => Some((s.clone(), id.as_str())),
                None => {
                    debug!("No price id configured for {}", s);
                    None
                }
            })
            .collect();

        if mapped.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: BTreeSet<&str> = mapped.iter().map(|(_, id)| *id).collect();
        let ids = ids.into_iter().collect::<Vec<_>>().join(",");
        debug!("Fetching prices for ids={}", ids);

        let response = self.fetch_simple_price(&ids).await?;
        parse_prices(&response, &mapped)
    }
}

/// Pick the `usd` quote for every mapped symbol out of a simple-price body
/// (`{"harmony": {"usd": 0.0123}, ...}`). Ids missing from the body are
/// skipped.
fn parse_prices(
    body: &serde_json::Value,
    mapped: &[(Symbol, &str)],
) -> Result<HashMap<Symbol, Decimal>, DataSourceError> {
    let quotes = body
        .as_object()
        .ok_or_else(|| DataSourceError::ParseError("Expected object response".to_string()))?;

    let mut prices = HashMap::new();
    for (symbol, id) in mapped {
        let Some(usd) = quotes.get(*id).and_then(|q| q.get("usd")) else {
            warn!("No USD quote for {} ({})", symbol, id);
            continue;
        };
        prices.insert(symbol.clone(), parse_number(usd)?);
    }
    Ok(prices)
}

fn parse_number(value: &serde_json::Value) -> Result<Decimal, DataSourceError> {
    let serde_json::Value::Number(number) = value else {
        return Err(DataSourceError::ParseError(format!("Invalid price: {}", value)));
    };

    // Exact for plain decimals; small quotes come back in exponent form.
    Decimal::from_str_canonical(&number.to_string())
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
        .ok_or_else(|| DataSourceError::ParseError(format!("Invalid price: {}", number)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_prices_shared_ids() {
        let body = json!({
            "harmony": {"usd": 0.01234},
            "tether": {"usd": 1.001},
            "bitcoin": {"usd": 67000}
        });
        let mapped = vec![
            (Symbol::new("ONE"), "harmony"),
            (Symbol::new("1USDT"), "tether"),
            (Symbol::new("USDT"), "tether"),
            (Symbol::new("1WBTC"), "bitcoin"),
        ];

        let prices = parse_prices(&body, &mapped).unwrap();
        assert_eq!(prices[&Symbol::new("ONE")], d("0.01234"));
        assert_eq!(prices[&Symbol::new("1USDT")], d("1.001"));
        assert_eq!(prices[&Symbol::new("USDT")], d("1.001"));
        assert_eq!(prices[&Symbol::new("1WBTC")], d("67000"));
    }

    #[test]
    fn test_parse_prices_skips_missing_ids() {
        let body = json!({"harmony": {"usd": 0.02}, "bitcoin": {}});
        let mapped = vec![
            (Symbol::new("ONE"), "harmony"),
            (Symbol::new("1WBTC"), "bitcoin"),
            (Symbol::new("1USDT"), "tether"),
        ];

        let prices = parse_prices(&body, &mapped).unwrap();
        assert_eq!(prices.len(), 1);
        assert!(prices.contains_key(&Symbol::new("ONE")));
    }

    #[test]
    fn test_parse_prices_exponent_form() {
        let body = json!({"dust": {"usd": 1.5e-7}});
        let prices = parse_prices(&body, &[(Symbol::new("DUST"), "dust")]).unwrap();
        assert_eq!(prices[&Symbol::new("DUST")].round_dp(8), d("0.00000015"));
    }

    #[test]
    fn test_parse_prices_rejects_non_object() {
        match parse_prices(&json!([]), &[]) {
            Err(DataSourceError::ParseError(_)) => {}
            other => panic!("Expected ParseError, got {other:?}"),
        }
        let body = json!({"harmony": {"usd": "abc"}});
        match parse_prices(&body, &[(Symbol::new("ONE"), "harmony")]) {
            Err(DataSourceError::ParseError(_)) => {}
            other => panic!("Expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unmapped_symbols_skip_the_network() {
        let source = CoinGeckoPriceSource::new("http://127.0.0.1:1".to_string(), HashMap::new());
        let prices = source.get_prices(&[Symbol::new("ONE")]).await.unwrap();
        assert!(prices.is_empty());
    }
}
