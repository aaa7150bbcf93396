use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppError;
use crate::orchestration::PortfolioView;

pub async fn get_portfolio(State(state): State<AppState>) -> Json<PortfolioView> {
    Json(state.session.view().await)
}

/// Reload balances and prices, then return the new view.
pub async fn refresh_portfolio(
    State(state): State<AppState>,
) -> Result<Json<PortfolioView>, AppError> {
    state.session.load().await?;
    Ok(Json(state.session.view().await))
}

pub async fn refresh_prices(
    State(state): State<AppState>,
) -> Result<Json<PortfolioView>, AppError> {
    state.session.refresh_prices().await?;
    Ok(Json(state.session.view().await))
}
