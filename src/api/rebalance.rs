use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::domain::{Asset, RebalancePlan, Transaction};
use crate::error::AppError;
use crate::orchestration::SessionStatus;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub assets: Vec<Asset>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub assets: Vec<Asset>,
    pub transactions: Vec<Transaction>,
}

pub async fn start(State(state): State<AppState>) -> Result<Json<StartResponse>, AppError> {
    let assets = state.session.start_rebalancing().await?;
    Ok(Json(StartResponse { assets }))
}

pub async fn cancel(State(state): State<AppState>) -> Result<Json<SessionStatus>, AppError> {
    state.session.cancel_rebalancing().await?;
    Ok(Json(state.session.status().await))
}

/// Validate the current targets and store and return the swaps they imply.
pub async fn prepare_plan(State(state): State<AppState>) -> Result<Json<RebalancePlan>, AppError> {
    Ok(Json(state.session.prepare_plan().await?))
}

/// Runs the whole plan before responding. A failed swap answers 502; the
/// partially rebalanced portfolio and ledger stay readable afterwards.
pub async fn execute(State(state): State<AppState>) -> Result<Json<ExecuteResponse>, AppError> {
    let assets = state.session.execute().await?;
    let transactions = state.session.transactions().await;
    Ok(Json(ExecuteResponse {
        assets,
        transactions,
    }))
}
