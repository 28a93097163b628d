//! Poll reconciliation: the pull path.
//!
//! Triggered on demand (an order status read, or a bulk sweep). The
//! gateway is asked for the transaction's current status, the answer goes
//! through the same canonical mapping as the webhook path, and expiry is
//! evaluated independently afterwards so a stale PENDING order can never
//! be served as live.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::PaymentGateway;
use crate::models::{ChangedBy, NewOrderStatusHistory, Order, OrderStatus};
use crate::repository::{OrderRepository, OrderStatusHistoryRepository};
use crate::services::transition::TransitionApplier;

/// Result of one reconciliation pass over an order.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub order: Order,
    pub status_changed: bool,
}

/// Reconciles orders against the gateway's current truth.
pub struct PollService {
    orders: Arc<dyn OrderRepository>,
    history: Arc<dyn OrderStatusHistoryRepository>,
    gateway: Arc<dyn PaymentGateway>,
    applier: Arc<TransitionApplier>,
}

impl PollService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        history: Arc<dyn OrderStatusHistoryRepository>,
        gateway: Arc<dyn PaymentGateway>,
        applier: Arc<TransitionApplier>,
    ) -> Self {
        Self {
            orders,
            history,
            gateway,
            applier,
        }
    }

    /// Reconciles one order.
    ///
    /// When the order carries a gateway transaction id and is still
    /// active, the gateway is queried and a differing mapped status is
    /// applied with a POLLING_SERVICE audit row. A gateway failure is
    /// "status unknown this round": it is audited but the caller still
    /// receives the last known order state. Afterwards, independently of
    /// the gateway result, a PENDING order past its payment deadline
    /// transitions to EXPIRED with a SYSTEM audit row.
    pub async fn check_order(&self, order_id: Uuid) -> Result<PollOutcome, AppError> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;

        let mut current = order;
        let mut status_changed = false;

        if let Some(transaction_id) = current.gateway_transaction_id.clone() {
            if !current.status.is_terminal() {
                match self.gateway.get_transaction_status(&transaction_id).await {
                    Ok(remote) => {
                        let mapped = OrderStatus::from_gateway(&remote.status);
                        if mapped != current.status {
                            let metadata = json!({
                                "gateway_status": remote.status,
                                "txid": remote.txid,
                                "gateway_updated_at": remote.updated_at,
                            });
                            let applied = self
                                .applier
                                .apply(
                                    &current,
                                    mapped,
                                    ChangedBy::PollingService,
                                    &format!("gateway poll reported {}", remote.status),
                                    Some(&transaction_id),
                                    metadata,
                                )
                                .await?;
                            status_changed = applied.changed;
                            current = applied.order;
                        }
                    }
                    Err(err) => {
                        // Status unknown this round. Audit the attempt and
                        // keep serving the last known state.
                        tracing::warn!(
                            "Gateway status check failed for order {}: {}",
                            current.id,
                            err
                        );
                        let attempt = NewOrderStatusHistory::attempt(
                            current.id,
                            current.status,
                            ChangedBy::PollingService,
                            "gateway status check failed",
                        )
                        .with_metadata(json!({ "error": err.to_string() }));
                        self.history.create(&attempt).await?;
                    }
                }
            }
        }

        // Lazy expiry, independent of the gateway answer.
        if current.status == OrderStatus::Pending && current.is_expired() {
            let applied = self
                .applier
                .apply(
                    &current,
                    OrderStatus::Expired,
                    ChangedBy::System,
                    "payment window expired",
                    None,
                    json!({ "expires_at": current.expires_at }),
                )
                .await?;
            status_changed = status_changed || applied.changed;
            current = applied.order;
        }

        Ok(PollOutcome {
            order: current,
            status_changed,
        })
    }

    /// Expires stale PENDING orders in bulk. Returns how many transitions
    /// actually applied (concurrent settlement makes this best effort).
    pub async fn sweep_expired(&self, limit: i64) -> Result<u64, AppError> {
        let stale = self.orders.find_expired_orders(Utc::now(), limit).await?;
        let mut expired = 0u64;
        for order in stale {
            let applied = self
                .applier
                .apply(
                    &order,
                    OrderStatus::Expired,
                    ChangedBy::System,
                    "payment window expired",
                    None,
                    json!({ "expires_at": order.expires_at }),
                )
                .await?;
            if applied.changed {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!("Expired {} stale pending orders", expired);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Environment, GatewayConfig, WebhookConfig};
    use crate::gateway::{GatewayTransactionStatus, MockPaymentGateway};
    use crate::models::{
        NewOrder, OrderStatusHistory, PaymentMethod, PointsTransaction, TransactionType,
        UserBalance,
    };
    use crate::repository::balances::MockUserBalanceRepository;
    use crate::repository::history::MockOrderStatusHistoryRepository;
    use crate::repository::orders::MockOrderRepository;
    use crate::repository::transactions::MockPointsTransactionRepository;
    use crate::repository::{
        PointsTransactionRepository, UserBalanceRepository,
    };
    use crate::services::credit_points::CreditPointsService;
    use bigdecimal::BigDecimal;
    use chrono::{Duration, Utc};
    use mockall::predicate::eq;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: "postgres://localhost/pontos_test".to_string(),
            environment: Environment::Development,
            gateway: GatewayConfig {
                base_url: "http://localhost:9999".to_string(),
                api_key: "test".to_string(),
                timeout_secs: 1,
            },
            webhook: WebhookConfig {
                secret: Some("secret".to_string()),
                enabled: true,
                allow_unsigned: false,
                replay_window_minutes: 60,
            },
            release_pending_on_terminal_failure: false,
        }
    }

    fn pending_order() -> Order {
        let quote = pontos_core::quote_purchase(&dec("100.00")).unwrap();
        let order = Order::create(
            NewOrder::from_quote(Uuid::new_v4(), quote, PaymentMethod::Pix),
            Utc::now(),
        )
        .unwrap();
        order.with_gateway_data("alfred_tx_1".to_string(), None, None, Utc::now())
    }

    fn remote(status: &str) -> GatewayTransactionStatus {
        GatewayTransactionStatus {
            status: status.to_string(),
            updated_at: Some(Utc::now()),
            txid: Some("E000001".to_string()),
            crypto_amount: None,
            crypto_type: None,
            network: None,
        }
    }

    fn saved_history(entry: &crate::models::NewOrderStatusHistory) -> OrderStatusHistory {
        OrderStatusHistory {
            id: Uuid::new_v4(),
            order_id: entry.order_id,
            previous_status: entry.previous_status,
            new_status: entry.new_status,
            changed_by: entry.changed_by,
            reason: entry.reason.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        }
    }

    fn pending_entry(order: &Order) -> PointsTransaction {
        let now = Utc::now();
        PointsTransaction {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            order_id: Some(order.id),
            transaction_type: TransactionType::Pending,
            amount: order.points_amount.clone(),
            description: "pending".to_string(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn balance_with_pending(order: &Order) -> UserBalance {
        let now = Utc::now();
        UserBalance {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            available_points: dec("0"),
            pending_points: order.points_amount.clone(),
            total_points: order.points_amount.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    struct Mocks {
        orders: MockOrderRepository,
        balances: MockUserBalanceRepository,
        transactions: MockPointsTransactionRepository,
        history: MockOrderStatusHistoryRepository,
        gateway: MockPaymentGateway,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                orders: MockOrderRepository::new(),
                balances: MockUserBalanceRepository::new(),
                transactions: MockPointsTransactionRepository::new(),
                history: MockOrderStatusHistoryRepository::new(),
                gateway: MockPaymentGateway::new(),
            }
        }

        fn into_service(self) -> PollService {
            let orders: Arc<dyn OrderRepository> = Arc::new(self.orders);
            let balances: Arc<dyn UserBalanceRepository> = Arc::new(self.balances);
            let transactions: Arc<dyn PointsTransactionRepository> = Arc::new(self.transactions);
            let history: Arc<dyn OrderStatusHistoryRepository> = Arc::new(self.history);
            let credit = Arc::new(CreditPointsService::new(
                orders.clone(),
                balances.clone(),
                transactions.clone(),
                history.clone(),
            ));
            let applier = Arc::new(TransitionApplier::new(
                orders.clone(),
                balances.clone(),
                transactions.clone(),
                history.clone(),
                credit,
                &test_config(),
            ));
            PollService::new(orders, history, Arc::new(self.gateway), applier)
        }
    }

    #[tokio::test]
    async fn test_poll_applies_completed_status_through_credit() {
        let order = pending_order();
        let entry = pending_entry(&order);
        let balance = balance_with_pending(&order);
        let mut mocks = Mocks::new();

        {
            let order = order.clone();
            // Once for the poll, once inside CreditPoints.
            mocks
                .orders
                .expect_find_by_id()
                .with(eq(order.id))
                .times(2)
                .returning(move |_| Ok(Some(order.clone())));
        }
        mocks
            .gateway
            .expect_get_transaction_status()
            .with(eq("alfred_tx_1"))
            .times(1)
            .returning(|_| Ok(remote("COMPLETED")));
        mocks
            .history
            .expect_create()
            .times(2)
            .returning(|entry| Ok(saved_history(entry)));
        {
            let entry = entry.clone();
            mocks
                .transactions
                .expect_find_pending_by_order_id()
                .returning(move |_| Ok(vec![entry.clone()]));
        }
        {
            let balance = balance.clone();
            mocks
                .balances
                .expect_find_by_user_id()
                .returning(move |_| Ok(Some(balance.clone())));
        }
        {
            let mut credited = entry.clone();
            credited.transaction_type = TransactionType::Credit;
            mocks
                .transactions
                .expect_mark_credited()
                .returning(move |_| Ok(Some(credited.clone())));
        }
        {
            let converted = balance
                .convert_pending_to_available(&order.points_amount)
                .unwrap();
            mocks
                .balances
                .expect_convert_pending_to_available()
                .times(1)
                .returning(move |_, _| Ok(Some(converted.clone())));
        }
        {
            let completed = Order {
                status: OrderStatus::Completed,
                ..order.clone()
            };
            mocks
                .orders
                .expect_transition_status()
                .with(eq(order.id), eq(OrderStatus::Completed))
                .times(1)
                .returning(move |_, _| Ok(Some(completed.clone())));
        }

        let service = mocks.into_service();
        let outcome = service.check_order(order.id).await.unwrap();

        assert!(outcome.status_changed);
        assert_eq!(outcome.order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_poll_gateway_failure_keeps_last_known_state() {
        let order = pending_order();
        let mut mocks = Mocks::new();

        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }
        mocks
            .gateway
            .expect_get_transaction_status()
            .returning(|_| Err(AppError::Gateway("connect timeout".to_string())));
        // The failed attempt is audited with an unchanged status.
        mocks
            .history
            .expect_create()
            .withf(|entry| {
                entry.previous_status == Some(OrderStatus::Pending)
                    && entry.new_status == OrderStatus::Pending
                    && entry.changed_by == ChangedBy::PollingService
            })
            .times(1)
            .returning(|entry| Ok(saved_history(entry)));

        let service = mocks.into_service();
        let outcome = service.check_order(order.id).await.unwrap();

        assert!(!outcome.status_changed);
        assert_eq!(outcome.order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_same_status_is_noop() {
        let order = pending_order();
        let mut mocks = Mocks::new();

        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }
        mocks
            .gateway
            .expect_get_transaction_status()
            .returning(|_| Ok(remote("PROCESSING")));

        let service = mocks.into_service();
        let outcome = service.check_order(order.id).await.unwrap();

        assert!(!outcome.status_changed);
        assert_eq!(outcome.order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_expires_stale_pending_order() {
        // Gateway still says PENDING, but the payment window has passed:
        // the expiry evaluation is independent and wins.
        let order = pending_order();
        let stale = Order {
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            ..order
        };
        let mut mocks = Mocks::new();

        {
            let stale = stale.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(stale.clone())));
        }
        mocks
            .gateway
            .expect_get_transaction_status()
            .returning(|_| Ok(remote("PENDING")));
        mocks
            .history
            .expect_create()
            .withf(|entry| {
                entry.new_status == OrderStatus::Expired && entry.changed_by == ChangedBy::System
            })
            .times(1)
            .returning(|entry| Ok(saved_history(entry)));
        {
            let expired = Order {
                status: OrderStatus::Expired,
                ..stale.clone()
            };
            mocks
                .orders
                .expect_transition_status()
                .with(eq(stale.id), eq(OrderStatus::Expired))
                .times(1)
                .returning(move |_, _| Ok(Some(expired.clone())));
        }
        // Pending points stay pending: no balance expectations.

        let service = mocks.into_service();
        let outcome = service.check_order(stale.id).await.unwrap();

        assert!(outcome.status_changed);
        assert_eq!(outcome.order.status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_poll_skips_gateway_for_settled_orders() {
        let order = pending_order();
        let completed = Order {
            status: OrderStatus::Completed,
            ..order
        };
        let mut mocks = Mocks::new();
        {
            let completed = completed.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(completed.clone())));
        }
        // No gateway expectation: a call would panic.

        let service = mocks.into_service();
        let outcome = service.check_order(completed.id).await.unwrap();

        assert!(!outcome.status_changed);
        assert_eq!(outcome.order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_poll_missing_order_is_not_found() {
        let mut mocks = Mocks::new();
        mocks.orders.expect_find_by_id().returning(|_| Ok(None));

        let service = mocks.into_service();
        let err = service.check_order(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_expires_stale_orders() {
        let first = Order {
            expires_at: Some(Utc::now() - Duration::minutes(30)),
            ..pending_order()
        };
        let second = Order {
            expires_at: Some(Utc::now() - Duration::minutes(40)),
            ..pending_order()
        };
        let mut mocks = Mocks::new();

        {
            let stale = vec![first.clone(), second.clone()];
            mocks
                .orders
                .expect_find_expired_orders()
                .times(1)
                .returning(move |_, _| Ok(stale.clone()));
        }
        mocks
            .history
            .expect_create()
            .times(2)
            .returning(|entry| Ok(saved_history(entry)));
        mocks
            .orders
            .expect_transition_status()
            .withf(|_, status| *status == OrderStatus::Expired)
            .times(2)
            .returning(|id, _| {
                // Simulate one of the two being settled concurrently.
                let _ = id;
                Ok(None)
            });

        let service = mocks.into_service();
        let expired = service.sweep_expired(100).await.unwrap();
        // Both guards rejected in this simulation.
        assert_eq!(expired, 0);
    }
}
