pub mod health;
pub mod portfolio;
pub mod rebalance;
pub mod targets;
pub mod tokens;
pub mod transactions;

use crate::orchestration::RebalanceSession;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RebalanceSession>,
}

impl AppState {
    pub fn new(session: Arc<RebalanceSession>) -> Self {
        Self { session }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/portfolio", get(portfolio::get_portfolio))
        .route("/v1/portfolio/refresh", post(portfolio::refresh_portfolio))
        .route("/v1/prices/refresh", post(portfolio::refresh_prices))
        .route("/v1/targets", put(targets::put_targets))
        .route("/v1/targets/validation", get(targets::get_validation))
        .route("/v1/rebalance/start", post(rebalance::start))
        .route("/v1/rebalance/cancel", post(rebalance::cancel))
        .route("/v1/rebalance/plan", post(rebalance::prepare_plan))
        .route("/v1/rebalance/execute", post(rebalance::execute))
        .route("/v1/transactions", get(transactions::get_transactions))
        .route("/v1/tokens", get(tokens::get_tokens))
        .layer(cors)
        .with_state(state)
}
