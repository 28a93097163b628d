//! CreateOrder: builds an order, reserves the points and opens the PIX
//! transaction with the gateway.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{CreateTransactionRequest, PaymentGateway};
use crate::models::{
    ChangedBy, NewOrder, NewOrderStatusHistory, NewPointsTransaction, Order, OrderStatus,
    PaymentMethod,
};
use crate::repository::{
    OrderRepository, OrderStatusHistoryRepository, PointsTransactionRepository,
    UserBalanceRepository,
};
use crate::services::transition::TransitionApplier;

/// Orchestrates the points purchase creation flow.
pub struct CreateOrderService {
    orders: Arc<dyn OrderRepository>,
    balances: Arc<dyn UserBalanceRepository>,
    transactions: Arc<dyn PointsTransactionRepository>,
    history: Arc<dyn OrderStatusHistoryRepository>,
    gateway: Arc<dyn PaymentGateway>,
    applier: Arc<TransitionApplier>,
}

impl CreateOrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        balances: Arc<dyn UserBalanceRepository>,
        transactions: Arc<dyn PointsTransactionRepository>,
        history: Arc<dyn OrderStatusHistoryRepository>,
        gateway: Arc<dyn PaymentGateway>,
        applier: Arc<TransitionApplier>,
    ) -> Self {
        Self {
            orders,
            balances,
            transactions,
            history,
            gateway,
            applier,
        }
    }

    /// Creates a points purchase order.
    ///
    /// Validates and prices the amount, persists a PENDING order with its
    /// genesis audit row, reserves the points (lazily creating the user's
    /// balance) alongside a PENDING ledger entry, then opens the payment
    /// with the gateway and attaches the QR data and the 20-minute
    /// expiry. A gateway failure marks the order FAILED, audits the
    /// reason and fails the creation loudly.
    pub async fn execute(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        payment_method: PaymentMethod,
    ) -> Result<Order, AppError> {
        // Step 1: price the purchase. Rejected amounts never touch storage.
        let quote =
            pontos_core::quote_purchase(&amount).map_err(|e| AppError::Validation(e.to_string()))?;

        // Step 2: persist the PENDING order.
        let order = Order::create(
            NewOrder::from_quote(user_id, quote, payment_method),
            Utc::now(),
        )?;
        let order = self.orders.create(&order).await?;

        // Step 3: genesis audit row (previous status null).
        self.history
            .create(&NewOrderStatusHistory::genesis(
                order.id,
                order.status,
                "order created",
            ))
            .await?;

        // Step 4: reserve the points as pending.
        self.balances
            .add_pending(user_id, &order.points_amount)
            .await?;
        self.transactions
            .create(&NewPointsTransaction::pending_for_order(
                order.id,
                user_id,
                order.points_amount.clone(),
            ))
            .await?;

        // Step 5: open the payment with the gateway.
        match order.payment_method {
            PaymentMethod::Pix => self.attach_pix_transaction(order).await,
        }
    }

    /// Opens the PIX transaction and attaches the gateway data. The
    /// payment deadline starts counting here.
    async fn attach_pix_transaction(&self, order: Order) -> Result<Order, AppError> {
        let request = CreateTransactionRequest::pix_deposit(order.id, order.total_amount.clone());

        match self.gateway.create_transaction(&request).await {
            Ok(transaction) => {
                let with_gateway = order.with_gateway_data(
                    transaction.transaction_id,
                    transaction.qr_copy_paste,
                    transaction.qr_image_url,
                    Utc::now(),
                );
                self.orders.update(&with_gateway).await
            }
            Err(err) => {
                tracing::error!(
                    "Gateway createTransaction failed for order {}: {}",
                    order.id,
                    err
                );
                self.applier
                    .apply(
                        &order,
                        OrderStatus::Failed,
                        ChangedBy::System,
                        "gateway transaction creation failed",
                        None,
                        json!({ "error": err.to_string() }),
                    )
                    .await?;
                Err(err)
            }
        }
    }
}
