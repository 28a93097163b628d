//! Order status history: the append-only transition audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::order::OrderStatus;

/// Who (or what) applied a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "changed_by_actor", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangedBy {
    /// Internal machinery (expiry sweeps, compensations).
    System,
    User,
    Admin,
    /// The Alfred gateway's webhook push.
    AlfredWebhook,
    /// The active status poll.
    PollingService,
}

/// One row per transition or reconciliation attempt. Rows are never
/// updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderStatusHistory {
    /// Unique identifier for this history row.
    pub id: Uuid,
    pub order_id: Uuid,
    /// Null marks the order's genesis row.
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: ChangedBy,
    pub reason: Option<String>,
    /// Additional context (gateway payloads, balances, errors).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Data required to append a history row.
#[derive(Debug, Clone)]
pub struct NewOrderStatusHistory {
    pub order_id: Uuid,
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: ChangedBy,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewOrderStatusHistory {
    /// The order's first row: no previous status.
    pub fn genesis(order_id: Uuid, status: OrderStatus, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            previous_status: None,
            new_status: status,
            changed_by: ChangedBy::System,
            reason: Some(reason.into()),
            metadata: serde_json::json!({}),
        }
    }

    /// A status transition row.
    pub fn transition(
        order_id: Uuid,
        previous_status: OrderStatus,
        new_status: OrderStatus,
        changed_by: ChangedBy,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            previous_status: Some(previous_status),
            new_status,
            changed_by,
            reason: Some(reason.into()),
            metadata: serde_json::json!({}),
        }
    }

    /// A reconciliation attempt that did not change the status (e.g. a
    /// gateway error captured for the audit trail).
    pub fn attempt(
        order_id: Uuid,
        status: OrderStatus,
        changed_by: ChangedBy,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            previous_status: Some(status),
            new_status: status,
            changed_by,
            reason: Some(reason.into()),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl OrderStatusHistory {
    /// Whether this row marks the order's creation.
    pub fn is_genesis(&self) -> bool {
        self.previous_status.is_none()
    }
}
