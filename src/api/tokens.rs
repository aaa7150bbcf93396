use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::domain::{ChainId, TokenInfo};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResponse {
    pub chain_id: ChainId,
    pub tokens: Vec<TokenInfo>,
}

pub async fn get_tokens(State(state): State<AppState>) -> Result<Json<TokensResponse>, AppError> {
    let tokens = state.session.supported_tokens().await?;
    Ok(Json(TokensResponse {
        chain_id: state.session.settings().chain_id,
        tokens,
    }))
}
