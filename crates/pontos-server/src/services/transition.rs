//! Shared application of externally reported statuses.
//!
//! The webhook and poll paths both land here after mapping a gateway
//! status through `OrderStatus::from_gateway`; applying the result in one
//! place is what makes the two paths converge to the same order and
//! ledger state regardless of delivery order.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{ChangedBy, NewOrderStatusHistory, Order, OrderStatus};
use crate::repository::{
    OrderRepository, OrderStatusHistoryRepository, PointsTransactionRepository,
    UserBalanceRepository,
};
use crate::services::credit_points::CreditPointsService;

/// Result of applying an external status to an order.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    /// The order after the attempt (unchanged when nothing applied).
    pub order: Order,
    pub changed: bool,
}

impl AppliedTransition {
    fn unchanged(order: &Order) -> Self {
        Self {
            order: order.clone(),
            changed: false,
        }
    }
}

/// Applies a mapped status to an order: audit row first, then dispatch.
pub struct TransitionApplier {
    orders: Arc<dyn OrderRepository>,
    balances: Arc<dyn UserBalanceRepository>,
    transactions: Arc<dyn PointsTransactionRepository>,
    history: Arc<dyn OrderStatusHistoryRepository>,
    credit: Arc<CreditPointsService>,
    release_pending_on_terminal_failure: bool,
}

impl TransitionApplier {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        balances: Arc<dyn UserBalanceRepository>,
        transactions: Arc<dyn PointsTransactionRepository>,
        history: Arc<dyn OrderStatusHistoryRepository>,
        credit: Arc<CreditPointsService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            orders,
            balances,
            transactions,
            history,
            credit,
            release_pending_on_terminal_failure: config.release_pending_on_terminal_failure,
        }
    }

    /// Applies `target` to the order.
    ///
    /// A matching status is a no-op. Otherwise the transition attempt is
    /// audited first, then dispatched: COMPLETED goes through the
    /// CreditPoints commit, terminal failures update the status only
    /// (optionally releasing the pending points, per policy), anything
    /// else is a plain guarded status update. A credit failure propagates
    /// but never rolls back the already-written audit row.
    pub async fn apply(
        &self,
        order: &Order,
        target: OrderStatus,
        changed_by: ChangedBy,
        reason: &str,
        transaction_id: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<AppliedTransition, AppError> {
        if order.status == target {
            return Ok(AppliedTransition::unchanged(order));
        }

        let attempt = NewOrderStatusHistory::transition(
            order.id,
            order.status,
            target,
            changed_by,
            reason,
        )
        .with_metadata(metadata);
        self.history.create(&attempt).await?;

        match target {
            OrderStatus::Completed => {
                let outcome = self.credit.execute(order.id, transaction_id).await?;
                Ok(AppliedTransition {
                    order: outcome.order,
                    changed: true,
                })
            }
            OrderStatus::Failed | OrderStatus::Cancelled | OrderStatus::Expired => {
                match self.orders.transition_status(order.id, target).await? {
                    Some(updated) => {
                        if self.release_pending_on_terminal_failure {
                            self.release_pending(&updated).await?;
                        }
                        Ok(AppliedTransition {
                            order: updated,
                            changed: true,
                        })
                    }
                    // The storage guard rejected the write: the order
                    // settled concurrently. Not an error; the audit row
                    // records the attempt.
                    None => Ok(AppliedTransition::unchanged(order)),
                }
            }
            OrderStatus::Pending | OrderStatus::Processing => {
                match self.orders.transition_status(order.id, target).await? {
                    Some(updated) => Ok(AppliedTransition {
                        order: updated,
                        changed: true,
                    }),
                    None => Ok(AppliedTransition::unchanged(order)),
                }
            }
        }
    }

    /// Releases the order's reserved points after a terminal failure:
    /// the PENDING ledger entry becomes REFUND and the pending bucket
    /// shrinks. Only reached when the release policy is enabled.
    async fn release_pending(&self, order: &Order) -> Result<(), AppError> {
        let entries = self.transactions.find_pending_by_order_id(order.id).await?;
        for entry in entries {
            // The guarded type change claims the entry; a concurrent
            // release or credit simply skips it.
            if self.transactions.mark_refunded(entry.id).await?.is_none() {
                continue;
            }
            if self
                .balances
                .release_pending(order.user_id, &entry.amount)
                .await?
                .is_none()
            {
                tracing::warn!(
                    "Pending bucket cannot cover release of {} for user {}",
                    entry.amount,
                    order.user_id
                );
            }
        }
        Ok(())
    }
}
