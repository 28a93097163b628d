//! Webhook intake endpoint for the Alfred payment gateway.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::webhook::WebhookPayload;
use crate::state::AppState;

/// Header carrying the HMAC signature. Older gateway versions put it in
/// the payload instead; the service accepts either.
const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Response for webhook processing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    /// False for duplicates and no-ops.
    pub processed: bool,
    pub processing_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_log_id: Option<Uuid>,
}

/// Creates the webhooks router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alfred", post(handle_alfred_webhook))
        .with_state(state)
}

/// POST /api/v1/webhooks/alfred
///
/// Receives status notifications from the gateway. The body is consumed
/// raw: the HMAC signature covers the exact bytes on the wire, so the
/// payload is only parsed after the bytes are captured.
///
/// Responses: 200 for success or already-processed, 401 for an invalid
/// signature, 404 for an unknown order, 400 for other validation
/// failures and 500 for unexpected errors (the gateway retries those).
async fn handle_alfred_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))?;

    let header_signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .webhooks
        .process(&body, header_signature, payload)
        .await?;

    Ok(Json(WebhookResponse {
        success: outcome.success,
        message: outcome.message,
        order_id: outcome.order_id,
        processed: outcome.processed,
        processing_time_ms: outcome.processing_time_ms,
        webhook_log_id: outcome.webhook_log_id,
    }))
}
