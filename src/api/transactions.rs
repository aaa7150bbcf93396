use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::domain::Transaction;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    /// Newest first.
    pub transactions: Vec<Transaction>,
}

pub async fn get_transactions(State(state): State<AppState>) -> Json<TransactionsResponse> {
    Json(TransactionsResponse {
        transactions: state.session.transactions().await,
    })
}
