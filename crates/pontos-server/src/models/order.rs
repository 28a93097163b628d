//! Order model and purchase lifecycle state machine.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use pontos_core::pricing::PurchaseQuote;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use crate::error::AppError;

/// PIX payments expire this many minutes after the gateway attaches the
/// QR code, not from order creation.
pub const PIX_EXPIRY_MINUTES: i64 = 20;

/// Possible states of an order in its lifecycle.
///
/// `Pending -> Processing -> Completed` is the success path;
/// `Pending | Processing -> Failed | Cancelled | Expired` are the terminal
/// failures. No transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Waiting for payment.
    Pending,
    /// Payment observed but not yet settled.
    Processing,
    /// Payment confirmed, points credited.
    Completed,
    /// Payment failed.
    Failed,
    /// Cancelled before settlement.
    Cancelled,
    /// Payment window elapsed without confirmation.
    Expired,
}

impl OrderStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Failed
                | OrderStatus::Cancelled
                | OrderStatus::Expired
        )
    }

    /// Maps the Alfred gateway status vocabulary onto the internal
    /// lifecycle.
    ///
    /// Both reconciliation paths (webhook push and status poll) must go
    /// through this single mapping so they can never disagree on the same
    /// external status. Unknown values map to `Pending` with a warning
    /// instead of failing the reconciliation.
    pub fn from_gateway(status: &str) -> OrderStatus {
        match status.trim().to_ascii_uppercase().as_str() {
            "PENDING" => OrderStatus::Pending,
            // The gateway reports PROCESSING while the payment is still
            // unsettled; for us that is not yet a state change.
            "PROCESSING" => OrderStatus::Pending,
            "COMPLETED" => OrderStatus::Completed,
            "FAILED" => OrderStatus::Failed,
            "EXPIRED" => OrderStatus::Expired,
            "CANCELLED" => OrderStatus::Cancelled,
            other => {
                tracing::warn!("Unknown gateway status '{}', treating as pending", other);
                OrderStatus::Pending
            }
        }
    }
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Brazilian instant payment.
    Pix,
}

/// Represents a single points-purchase order.
///
/// Orders are never mutated in place: `with_status` and
/// `with_gateway_data` return new validated snapshots, and rows are only
/// superseded, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    /// Unique identifier for this order.
    pub id: Uuid,
    /// User who initiated the purchase.
    pub user_id: Uuid,
    /// Amount the user asked to convert into points.
    pub requested_amount: BigDecimal,
    /// Service fee charged on top.
    pub fee_amount: BigDecimal,
    /// Total charge: requested + fee, exactly.
    pub total_amount: BigDecimal,
    /// Points credited on completion (1:1 with requested_amount).
    pub points_amount: BigDecimal,
    /// Current lifecycle status.
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// Transaction id assigned by the payment gateway.
    pub gateway_transaction_id: Option<String>,
    /// PIX copy-and-paste payload.
    pub qr_code: Option<String>,
    pub qr_image_url: Option<String>,
    /// Payment deadline, set when gateway data is attached.
    pub expires_at: Option<DateTime<Utc>>,
    /// Additional order metadata (JSONB).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub requested_amount: BigDecimal,
    pub fee_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub points_amount: BigDecimal,
    pub payment_method: PaymentMethod,
    pub metadata: serde_json::Value,
}

impl NewOrder {
    /// Builds a new order from a priced purchase quote.
    pub fn from_quote(user_id: Uuid, quote: PurchaseQuote, payment_method: PaymentMethod) -> Self {
        Self {
            user_id,
            requested_amount: quote.requested_amount,
            fee_amount: quote.fee_amount,
            total_amount: quote.total_amount,
            points_amount: quote.points_amount,
            payment_method,
            metadata: serde_json::json!({}),
        }
    }
}

impl Order {
    /// Materializes a new PENDING order from its creation data.
    pub fn create(new_order: NewOrder, now: DateTime<Utc>) -> Result<Order, AppError> {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: new_order.user_id,
            requested_amount: new_order.requested_amount,
            fee_amount: new_order.fee_amount,
            total_amount: new_order.total_amount,
            points_amount: new_order.points_amount,
            status: OrderStatus::Pending,
            payment_method: new_order.payment_method,
            gateway_transaction_id: None,
            qr_code: None,
            qr_image_url: None,
            expires_at: None,
            metadata: new_order.metadata,
            created_at: now,
            updated_at: now,
        };
        order.validate()?;
        Ok(order)
    }

    /// Checks the amount invariants: everything positive, fee
    /// non-negative, `total == requested + fee` and 1:1 points.
    pub fn validate(&self) -> Result<(), AppError> {
        let zero = BigDecimal::from(0);
        if self.requested_amount <= zero {
            return Err(AppError::Validation(
                "Order amount must be positive".to_string(),
            ));
        }
        if self.fee_amount < zero {
            return Err(AppError::Validation(
                "Order fee must not be negative".to_string(),
            ));
        }
        if self.total_amount != &self.requested_amount + &self.fee_amount {
            return Err(AppError::Validation(
                "Order total must equal requested amount plus fee".to_string(),
            ));
        }
        if self.points_amount != self.requested_amount {
            return Err(AppError::Validation(
                "Order points must match the requested amount".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a copy of this order with the given status.
    ///
    /// Transitions out of a terminal state are rejected and surfaced to
    /// the caller, never silently applied.
    pub fn with_status(&self, status: OrderStatus, now: DateTime<Utc>) -> Result<Order, AppError> {
        if self.status.is_terminal() {
            return Err(AppError::StateConflict(format!(
                "Order {} is {:?} and cannot transition to {:?}",
                self.id, self.status, status
            )));
        }
        Ok(Order {
            status,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Returns a copy of this order with gateway payment data attached.
    ///
    /// The payment deadline starts here: 20 minutes from attachment.
    pub fn with_gateway_data(
        &self,
        transaction_id: String,
        qr_code: Option<String>,
        qr_image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Order {
        Order {
            gateway_transaction_id: Some(transaction_id),
            qr_code,
            qr_image_url,
            expires_at: Some(now + Duration::minutes(PIX_EXPIRY_MINUTES)),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Whether the payment window has elapsed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against an explicit clock.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Whether the order can start payment processing.
    pub fn can_be_processed(&self) -> bool {
        self.status == OrderStatus::Pending && !self.is_expired()
    }

    /// Whether the order can still be completed.
    pub fn can_be_completed(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Processing) && !self.is_expired()
    }

    /// Whether the order can be cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Processing)
    }
}
