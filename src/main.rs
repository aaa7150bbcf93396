use anyhow::Context;
use portfolio_rebalancer::datasource::{
    CoinGeckoPriceSource, HttpTokenListSource, RpcBalanceSource, SimulatedSwapVenue,
};
use portfolio_rebalancer::orchestration::{spawn_price_refresher, Collaborators, SessionSettings};
use portfolio_rebalancer::{api, Address, Config, RebalanceSession, TokenInfo, TokenRepository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let native = TokenInfo {
        chain_id: config.chain_id,
        address: Address::native(),
        symbol: config.native_symbol.clone(),
        name: config.native_symbol.to_string(),
        decimals: config.native_decimals,
        logo_uri: None,
    };
    let tokens = TokenRepository::new(
        Arc::new(HttpTokenListSource::new(config.token_list_url.clone())),
        config.token_list_ttl,
    )
    .with_native_token(native);

    let collaborators = Collaborators {
        balances: Arc::new(RpcBalanceSource::new(config.rpc_url.clone())),
        prices: Arc::new(CoinGeckoPriceSource::new(
            config.price_api_url.clone(),
            config.price_ids.clone(),
        )),
        tokens: Arc::new(tokens),
        venue: Arc::new(SimulatedSwapVenue::new()),
    };
    let session = Arc::new(RebalanceSession::new(
        SessionSettings::from_config(&config),
        collaborators,
    ));

    // The service still starts when the first load fails; clients can retry
    // through /v1/portfolio/refresh.
    if let Err(e) = session.load().await {
        tracing::warn!("Initial portfolio load failed: {}", e);
    }

    let _refresher = spawn_price_refresher(session.clone(), config.price_refresh_interval);

    let app = api::create_router(api::AppState::new(session));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
