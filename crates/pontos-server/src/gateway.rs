//! Payment gateway client seam.
//!
//! The reconciliation core only sees this trait; the Alfred HTTP adapter
//! lives in `alfred` and is the single component talking to the outside
//! world. Gateway failures are `AppError::Gateway` and must be treated by
//! callers as "status unknown this round", never as a terminal state.

pub mod alfred;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use alfred::AlfredClient;

/// Request to open a transaction with the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub amount: BigDecimal,
    /// Currency of `amount`, e.g. "BRL".
    pub amount_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_amount: Option<BigDecimal>,
    pub payment_method: String,
    /// Transaction direction, e.g. "DEPOSIT".
    #[serde(rename = "type")]
    pub transaction_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Our order id, echoed back on webhooks as externalId.
    pub external_id: Uuid,
}

impl CreateTransactionRequest {
    /// A PIX deposit for the given order.
    pub fn pix_deposit(order_id: Uuid, amount: BigDecimal) -> Self {
        Self {
            amount,
            amount_type: "BRL".to_string(),
            crypto_type: None,
            crypto_amount: None,
            payment_method: "PIX".to_string(),
            transaction_type: "DEPOSIT".to_string(),
            wallet_address: None,
            network: None,
            external_id: order_id,
        }
    }
}

/// A transaction freshly opened with the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTransaction {
    pub transaction_id: String,
    /// PIX copy-and-paste payload.
    pub qr_copy_paste: Option<String>,
    pub qr_image_url: Option<String>,
}

/// Current status of a gateway transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTransactionStatus {
    /// External status vocabulary; mapped via `OrderStatus::from_gateway`.
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub txid: Option<String>,
    pub crypto_amount: Option<BigDecimal>,
    pub crypto_type: Option<String>,
    pub network: Option<String>,
}

/// Client seam for the payment gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<GatewayTransaction, AppError>;

    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransactionStatus, AppError>;
}
