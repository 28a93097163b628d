//! Balance lookup endpoints.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{PointsTransaction, TransactionType, UserBalance};
use crate::state::AppState;

/// How many recent ledger entries the balance view carries.
const RECENT_TRANSACTIONS: i64 = 10;

/// A ledger entry as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PointsTransaction> for TransactionResponse {
    fn from(tx: &PointsTransaction) -> Self {
        Self {
            id: tx.id,
            order_id: tx.order_id,
            transaction_type: tx.transaction_type,
            amount: tx.amount.to_string(),
            description: tx.description.clone(),
            created_at: tx.created_at,
        }
    }
}

/// Response for the balance endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub available_points: String,
    pub pending_points: String,
    pub total_points: String,
    pub recent_transactions: Vec<TransactionResponse>,
}

/// Creates the balances router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{user_id}", get(get_balance))
        .with_state(state)
}

/// GET /api/v1/balances/{user_id}
///
/// Returns the user's points balance with their recent ledger entries.
/// Balances are created lazily on the first order, so an unknown user
/// reads as all zeros rather than 404.
async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state
        .balances
        .find_by_user_id(user_id)
        .await?
        .unwrap_or_else(|| UserBalance::empty(user_id, Utc::now()));

    let recent = state
        .transactions
        .find_recent_by_user(user_id, RECENT_TRANSACTIONS)
        .await?;

    Ok(Json(BalanceResponse {
        user_id,
        available_points: balance.available_points.to_string(),
        pending_points: balance.pending_points.to_string(),
        total_points: balance.total_points.to_string(),
        recent_transactions: recent.iter().map(TransactionResponse::from).collect(),
    }))
}
