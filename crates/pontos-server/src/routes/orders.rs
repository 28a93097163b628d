//! Order creation, lookup and audit trail endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ChangedBy, Order, OrderStatus, OrderStatusHistory, PaymentMethod};
use crate::state::AppState;

/// Default and ceiling for list queries.
const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

/// Request body for creating a points purchase.
/// Note: in production the user id comes from authentication; the
/// gatekeeping layer is outside this service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    /// Amount in currency units, as a string to keep it exact.
    pub amount: String,
    /// Defaults to pix.
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// An order as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub requested_amount: String,
    pub fee_amount: String,
    pub total_amount: String,
    pub points_amount: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            requested_amount: order.requested_amount.to_string(),
            fee_amount: order.fee_amount.to_string(),
            total_amount: order.total_amount.to_string(),
            points_amount: order.points_amount.to_string(),
            status: order.status,
            payment_method: order.payment_method,
            gateway_transaction_id: order.gateway_transaction_id.clone(),
            qr_code: order.qr_code.clone(),
            qr_image_url: order.qr_image_url.clone(),
            expires_at: order.expires_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Query parameters for listing a user's orders.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// A history row as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: ChangedBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderStatusHistory> for HistoryEntryResponse {
    fn from(entry: &OrderStatusHistory) -> Self {
        Self {
            id: entry.id,
            previous_status: entry.previous_status,
            new_status: entry.new_status,
            changed_by: entry.changed_by,
            reason: entry.reason.clone(),
            metadata: entry.metadata.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Creates the orders router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/history", get(get_order_history))
        .with_state(state)
}

/// Parses and validates the payment method.
fn parse_payment_method(method: Option<&str>) -> Result<PaymentMethod, AppError> {
    match method {
        None => Ok(PaymentMethod::Pix),
        Some("pix") | Some("PIX") => Ok(PaymentMethod::Pix),
        Some(other) => Err(AppError::Validation(format!(
            "Unsupported payment method: {}. Supported: pix",
            other
        ))),
    }
}

/// POST /api/v1/orders
///
/// Creates a points purchase order: validates the amount, reserves the
/// points as pending and opens the PIX transaction with the gateway. The
/// response carries the QR data and the payment deadline.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let amount = BigDecimal::from_str(&request.amount)
        .map_err(|e| AppError::Validation(format!("Invalid amount format: {}", e)))?;
    let payment_method = parse_payment_method(request.payment_method.as_deref())?;

    let order = state
        .create_order
        .execute(request.user_id, amount, payment_method)
        .await?;

    Ok(Json(OrderResponse::from(&order)))
}

/// GET /api/v1/orders/{id}
///
/// Returns the order after a reconciliation pass: the gateway is polled
/// for the current transaction status and expiry is evaluated, so a
/// stale PENDING is never served as live.
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let outcome = state.poller.check_order(order_id).await?;
    Ok(Json(OrderResponse::from(&outcome.order)))
}

/// GET /api/v1/orders?userId=...
///
/// Lists a user's orders, newest first.
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let orders = state.orders.find_by_user_id(query.user_id, limit).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /api/v1/orders/{id}/history
///
/// Returns the order's full audit trail, oldest first.
async fn get_order_history(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntryResponse>>, AppError> {
    // 404 for unknown orders rather than an empty trail.
    state
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;

    let entries = state.history.list_by_order_id(order_id).await?;
    Ok(Json(entries.iter().map(HistoryEntryResponse::from).collect()))
}
