//! CreditPoints: the ledger-commit boundary.
//!
//! This service is the only place allowed to move points from pending to
//! available and to mark an order COMPLETED. Every step of the commit is
//! a guarded storage operation, and the PENDING -> CREDIT claim runs
//! first: it is the per-order exclusivity guard, so a concurrent
//! completion of the same order stops before any balance movement.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ChangedBy, NewOrderStatusHistory, Order, OrderStatus, PointsTransaction, UserBalance,
};
use crate::repository::{
    OrderRepository, OrderStatusHistoryRepository, PointsTransactionRepository,
    UserBalanceRepository,
};

/// Everything the commit produced, for callers and the audit trail.
#[derive(Debug, Clone)]
pub struct CreditOutcome {
    pub order: Order,
    pub balance: UserBalance,
    pub transaction: PointsTransaction,
}

/// Credits an order's points once its payment is confirmed.
pub struct CreditPointsService {
    orders: Arc<dyn OrderRepository>,
    balances: Arc<dyn UserBalanceRepository>,
    transactions: Arc<dyn PointsTransactionRepository>,
    history: Arc<dyn OrderStatusHistoryRepository>,
}

impl CreditPointsService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        balances: Arc<dyn UserBalanceRepository>,
        transactions: Arc<dyn PointsTransactionRepository>,
        history: Arc<dyn OrderStatusHistoryRepository>,
    ) -> Self {
        Self {
            orders,
            balances,
            transactions,
            history,
        }
    }

    /// Completes an order and credits its points.
    ///
    /// Preconditions: the order exists and can still be completed, the
    /// caller-supplied gateway transaction id (if any) matches the
    /// order's, and exactly one PENDING ledger entry is tied to the
    /// order. The commit then converts the user's pending points, marks
    /// the ledger entry CREDIT and the order COMPLETED, and appends a
    /// completion history row carrying the before/after balances.
    ///
    /// On any failure inside the commit the failure is audited, the order
    /// is moved to FAILED and the error propagates to the caller.
    pub async fn execute(
        &self,
        order_id: Uuid,
        expected_transaction_id: Option<&str>,
    ) -> Result<CreditOutcome, AppError> {
        // Preconditions, all before any mutation.
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;

        if !order.can_be_completed() {
            return Err(AppError::StateConflict(format!(
                "Order {} cannot be completed from status {:?}",
                order.id, order.status
            )));
        }

        if let Some(expected) = expected_transaction_id {
            if order.gateway_transaction_id.as_deref() != Some(expected) {
                return Err(AppError::StateConflict(format!(
                    "Gateway transaction id mismatch for order {}",
                    order.id
                )));
            }
        }

        let mut pending = self.transactions.find_pending_by_order_id(order.id).await?;
        if pending.len() != 1 {
            return Err(AppError::StateConflict(format!(
                "Order {} has {} pending ledger entries, expected exactly one",
                order.id,
                pending.len()
            )));
        }
        let entry = pending.remove(0);

        let balance_before = self
            .balances
            .find_by_user_id(order.user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Balance not found for user {}", order.user_id))
            })?;

        match self.commit(&order, &entry).await {
            Ok(outcome) => {
                let completion = NewOrderStatusHistory::transition(
                    order.id,
                    order.status,
                    OrderStatus::Completed,
                    ChangedBy::System,
                    "points credited",
                )
                .with_metadata(json!({
                    "points_amount": order.points_amount.to_string(),
                    "available_before": balance_before.available_points.to_string(),
                    "pending_before": balance_before.pending_points.to_string(),
                    "available_after": outcome.balance.available_points.to_string(),
                    "pending_after": outcome.balance.pending_points.to_string(),
                    "ledger_entry_id": outcome.transaction.id.to_string(),
                }));
                self.history.create(&completion).await?;
                Ok(outcome)
            }
            Err(err) => {
                self.record_failure(&order, &err).await;
                Err(err)
            }
        }
    }

    /// The commit sequence, each step a guarded single-statement write.
    async fn commit(
        &self,
        order: &Order,
        entry: &PointsTransaction,
    ) -> Result<CreditOutcome, AppError> {
        // Claim the ledger entry first: only one caller can move it out
        // of PENDING.
        let transaction = self
            .transactions
            .mark_credited(entry.id)
            .await?
            .ok_or_else(|| {
                AppError::StateConflict(format!("Ledger entry {} is no longer pending", entry.id))
            })?;

        let balance = self
            .balances
            .convert_pending_to_available(order.user_id, &order.points_amount)
            .await?
            .ok_or_else(|| {
                AppError::StateConflict(format!(
                    "Insufficient pending points for user {}",
                    order.user_id
                ))
            })?;

        let completed = self
            .orders
            .transition_status(order.id, OrderStatus::Completed)
            .await?
            .ok_or_else(|| {
                AppError::StateConflict(format!("Order {} is no longer completable", order.id))
            })?;

        Ok(CreditOutcome {
            order: completed,
            balance,
            transaction,
        })
    }

    /// Audits a failed commit and moves the order to FAILED. Best effort:
    /// the original error is what propagates, so follow-up failures are
    /// only logged.
    async fn record_failure(&self, order: &Order, err: &AppError) {
        let failure = NewOrderStatusHistory::transition(
            order.id,
            order.status,
            OrderStatus::Failed,
            ChangedBy::System,
            format!("points credit failed: {}", err),
        );
        if let Err(audit_err) = self.history.create(&failure).await {
            tracing::error!(
                "Failed to audit credit failure for order {}: {}",
                order.id,
                audit_err
            );
        }
        match self.orders.transition_status(order.id, OrderStatus::Failed).await {
            Ok(Some(_)) => {}
            // The guard rejected the write: the order settled concurrently.
            Ok(None) => {}
            Err(update_err) => {
                tracing::error!(
                    "Failed to mark order {} failed after credit error: {}",
                    order.id,
                    update_err
                );
            }
        }
    }
}
