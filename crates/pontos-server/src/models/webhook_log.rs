//! Webhook log: the append-only record of every delivery attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per inbound webhook delivery, valid or not.
///
/// The row is persisted before the delivery is acted on, so every attempt
/// is auditable even when it is rejected, and it doubles as the
/// idempotency anchor: a repeated `webhook_id`, or a valid row with the
/// same `(transaction_id, status)` inside the replay window, marks a
/// duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookLog {
    /// Unique identifier for this log row.
    pub id: Uuid,
    /// Delivery id assigned by the gateway, when provided.
    pub webhook_id: Option<String>,
    /// Gateway transaction the delivery refers to.
    pub transaction_id: String,
    /// The gateway's externalId field: our order id, as received.
    pub external_id: Option<String>,
    /// Raw external status string, before mapping.
    pub status: String,
    /// Full payload as received (JSONB).
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub is_valid: bool,
    pub error_message: Option<String>,
    /// Wall-clock cost of handling the delivery.
    pub processing_time_ms: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data required to record a delivery attempt.
#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub webhook_id: Option<String>,
    pub transaction_id: String,
    pub external_id: Option<String>,
    pub status: String,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub is_valid: bool,
    pub error_message: Option<String>,
}
