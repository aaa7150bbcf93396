//! Token-list retrieval and the TTL-cached token metadata repository.

use super::{classify_status, DataSourceError, TokenListSource};
use crate::domain::{ChainId, Symbol, TokenInfo, TokenList};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use moka::future::Cache;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches a token list published as JSON at a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpTokenListSource {
    client: Client,
    url: String,
}

impl HttpTokenListSource {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl TokenListSource for HttpTokenListSource {
    async fn fetch_token_list(&self) -> Result<TokenList, DataSourceError> {
        debug!("Fetching token list from {}", self.url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(&self.url).send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
            })?;

            classify_status(response.status())?;

            response
                .json::<TokenList>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

/// Per-chain token metadata, cached for `ttl`.
///
/// Native-coin entries are appended to every fetched list; token lists
/// normally only carry contract tokens.
#[derive(Debug)]
pub struct TokenRepository {
    source: Arc<dyn TokenListSource>,
    ttl: Duration,
    native_tokens: Vec<TokenInfo>,
    cache: Cache<ChainId, Arc<Vec<TokenInfo>>>,
}

impl TokenRepository {
    pub fn new(source: Arc<dyn TokenListSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            native_tokens: Vec::new(),
            cache: Cache::builder().time_to_live(ttl).max_capacity(16).build(),
        }
    }

    pub fn with_native_token(mut self, token: TokenInfo) -> Self {
        self.native_tokens.push(token);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// All known tokens on `chain_id`. Served from cache while fresh.
    pub async fn get(&self, chain_id: ChainId) -> Result<Arc<Vec<TokenInfo>>, DataSourceError> {
        if let Some(tokens) = self.cache.get(&chain_id).await {
            return Ok(tokens);
        }

        let list = self.source.fetch_token_list().await?;
        let mut tokens = list.tokens_for_chain(chain_id);
        for native in self.native_tokens.iter().filter(|t| t.chain_id == chain_id) {
            if !tokens.iter().any(|t| t.symbol == native.symbol) {
                tokens.push(native.clone());
            }
        }
        info!(
            "Loaded {} tokens for chain {} from {}",
            tokens.len(),
            chain_id,
            list.name
        );

        let tokens = Arc::new(tokens);
        self.cache.insert(chain_id, tokens.clone()).await;
        Ok(tokens)
    }

    /// The tokens named in `symbols`, in that order. Unknown symbols are
    /// skipped.
    pub async fn supported(
        &self,
        chain_id: ChainId,
        symbols: &[Symbol],
    ) -> Result<Vec<TokenInfo>, DataSourceError> {
        let tokens = self.get(chain_id).await?;
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let found = tokens.iter().find(|t| &t.symbol == symbol).cloned();
                if found.is_none() {
                    warn!("Token {} not found on chain {}", symbol, chain_id);
                }
                found
            })
            .collect())
    }
}
