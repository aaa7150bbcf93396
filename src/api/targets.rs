use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::domain::{Decimal, Symbol};
use crate::engine::TargetValidation;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsRequest {
    /// Target percentage per symbol, 0–100.
    pub targets: HashMap<Symbol, Decimal>,
}

pub async fn put_targets(
    State(state): State<AppState>,
    Json(request): Json<TargetsRequest>,
) -> Result<Json<TargetValidation>, AppError> {
    if request.targets.is_empty() {
        return Err(AppError::BadRequest("No targets given".into()));
    }
    let validation = state.session.set_targets(&request.targets).await?;
    Ok(Json(validation))
}

pub async fn get_validation(State(state): State<AppState>) -> Json<TargetValidation> {
    Json(state.session.validation().await)
}
