//! Points transaction model: individual ledger entries tied to orders.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Types of points ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Points reserved for an unsettled order.
    Pending,
    /// Points made spendable after payment confirmation.
    Credit,
    /// Points removed from a balance.
    Debit,
    /// Reserved points returned after a terminal failure.
    Refund,
}

/// Represents a single ledger-affecting event.
///
/// A PENDING entry is created alongside its order and transitions to
/// CREDIT (or REFUND) exactly once; the type change is the per-order
/// exclusivity guard for crediting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointsTransaction {
    /// Unique identifier for this ledger entry.
    pub id: Uuid,
    pub user_id: Uuid,
    /// Order this entry belongs to (null for standalone adjustments).
    pub order_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    /// Always positive; the type carries the direction.
    pub amount: BigDecimal,
    pub description: String,
    /// Additional entry metadata (JSONB).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewPointsTransaction {
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub description: String,
    pub metadata: serde_json::Value,
}

impl NewPointsTransaction {
    /// Creates the PENDING entry that accompanies a new order.
    pub fn pending_for_order(order_id: Uuid, user_id: Uuid, amount: BigDecimal) -> Self {
        Self {
            user_id,
            order_id: Some(order_id),
            transaction_type: TransactionType::Pending,
            amount,
            description: format!("Points purchase pending payment (order {})", order_id),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl PointsTransaction {
    pub fn is_pending(&self) -> bool {
        self.transaction_type == TransactionType::Pending
    }

    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionType::Credit
    }
}
