//! Shared application state: repositories, gateway client and services,
//! wired once at startup and injected into the handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::gateway::{AlfredClient, PaymentGateway};
use crate::repository::{
    OrderRepository, OrderStatusHistoryRepository, PgOrderRepository,
    PgOrderStatusHistoryRepository, PgPointsTransactionRepository, PgUserBalanceRepository,
    PgWebhookLogRepository, PointsTransactionRepository, UserBalanceRepository,
    WebhookLogRepository,
};
use crate::services::{
    CreateOrderService, CreditPointsService, PollService, TransitionApplier, WebhookService,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderRepository>,
    pub balances: Arc<dyn UserBalanceRepository>,
    pub transactions: Arc<dyn PointsTransactionRepository>,
    pub history: Arc<dyn OrderStatusHistoryRepository>,
    pub webhook_logs: Arc<dyn WebhookLogRepository>,
    pub create_order: Arc<CreateOrderService>,
    pub webhooks: Arc<WebhookService>,
    pub poller: Arc<PollService>,
}

impl AppState {
    /// Wires the production state: PostgreSQL repositories and the Alfred
    /// HTTP gateway client.
    pub fn new(pool: PgPool, config: &AppConfig) -> Result<AppState, AppError> {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(AlfredClient::new(&config.gateway)?);
        Ok(Self::with_gateway(pool, config, gateway))
    }

    /// Wires the state with an injected gateway client (tests use a stub
    /// so no network is involved).
    pub fn with_gateway(
        pool: PgPool,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> AppState {
        let orders: Arc<dyn OrderRepository> = Arc::new(PgOrderRepository::new(pool.clone()));
        let balances: Arc<dyn UserBalanceRepository> =
            Arc::new(PgUserBalanceRepository::new(pool.clone()));
        let transactions: Arc<dyn PointsTransactionRepository> =
            Arc::new(PgPointsTransactionRepository::new(pool.clone()));
        let history: Arc<dyn OrderStatusHistoryRepository> =
            Arc::new(PgOrderStatusHistoryRepository::new(pool.clone()));
        let webhook_logs: Arc<dyn WebhookLogRepository> =
            Arc::new(PgWebhookLogRepository::new(pool));

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
            config,
        ));
        let create_order = Arc::new(CreateOrderService::new(
            orders.clone(),
            balances.clone(),
            transactions.clone(),
            history.clone(),
            gateway.clone(),
            applier.clone(),
        ));
        let webhooks = Arc::new(WebhookService::new(
            webhook_logs.clone(),
            orders.clone(),
            applier.clone(),
            config,
        ));
        let poller = Arc::new(PollService::new(
            orders.clone(),
            history.clone(),
            gateway,
            applier,
        ));

        AppState {
            orders,
            balances,
            transactions,
            history,
            webhook_logs,
            create_order,
            webhooks,
            poller,
        }
    }
}
