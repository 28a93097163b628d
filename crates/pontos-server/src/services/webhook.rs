//! Webhook reconciliation: the push path.
//!
//! Deliveries from the gateway arrive unordered and possibly duplicated.
//! The flow is: kill switch, idempotency check (before any signature
//! work), signature verification with an unconditional audit row, then
//! order lookup, transaction-id guard, canonical status mapping and
//! dispatch. Every failure after the audit row is recorded against it and
//! surfaces as an error response so the gateway retries the delivery.

use std::sync::Arc;
use std::time::Instant;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{ChangedBy, NewWebhookLog, OrderStatus};
use crate::repository::{OrderRepository, WebhookLogRepository};
use crate::services::transition::TransitionApplier;

/// Inbound webhook payload from the Alfred gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Delivery id assigned by the gateway.
    #[serde(default)]
    pub webhook_id: Option<String>,
    pub transaction_id: String,
    /// External status vocabulary (PENDING, PROCESSING, COMPLETED, ...).
    pub status: String,
    #[serde(default)]
    pub previous_status: Option<String>,
    /// Our order id, as assigned at transaction creation.
    pub external_id: String,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub amount_type: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Signature may also travel in the body for older gateway versions.
    #[serde(default)]
    pub signature: Option<String>,
}

/// Structured result returned to the gateway.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub success: bool,
    pub message: String,
    pub order_id: Option<Uuid>,
    /// False when the delivery was a duplicate or a no-op.
    pub processed: bool,
    pub processing_time_ms: i64,
    pub webhook_log_id: Option<Uuid>,
}

impl WebhookOutcome {
    fn skipped(message: impl Into<String>, started: Instant) -> Self {
        Self {
            success: true,
            message: message.into(),
            order_id: None,
            processed: false,
            processing_time_ms: elapsed_ms(started),
            webhook_log_id: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

/// Processes webhook deliveries from the payment gateway.
pub struct WebhookService {
    logs: Arc<dyn WebhookLogRepository>,
    orders: Arc<dyn OrderRepository>,
    applier: Arc<TransitionApplier>,
    secret: Option<String>,
    enabled: bool,
    /// Already gated by environment at construction.
    allow_unsigned: bool,
    replay_window_minutes: i64,
}

impl WebhookService {
    pub fn new(
        logs: Arc<dyn WebhookLogRepository>,
        orders: Arc<dyn OrderRepository>,
        applier: Arc<TransitionApplier>,
        config: &AppConfig,
    ) -> Self {
        Self {
            logs,
            orders,
            applier,
            secret: config.webhook.secret.clone(),
            enabled: config.webhook.enabled,
            allow_unsigned: config.allow_unsigned_webhooks(),
            replay_window_minutes: config.webhook.replay_window_minutes,
        }
    }

    /// Handles one webhook delivery.
    ///
    /// `raw_body` is the request body exactly as received; the signature
    /// is computed over those bytes, so they must not be re-serialized
    /// before verification.
    pub async fn process(
        &self,
        raw_body: &[u8],
        header_signature: Option<&str>,
        payload: WebhookPayload,
    ) -> Result<WebhookOutcome, AppError> {
        let started = Instant::now();

        // Step 1: administrative kill switch; no side effects at all.
        if !self.enabled {
            return Ok(WebhookOutcome::skipped("webhooks are disabled", started));
        }

        // Step 2: idempotency, checked before the signature work so
        // replays stay cheap.
        if self.already_processed(&payload).await? {
            tracing::info!(
                "Webhook for transaction {} status {} already processed",
                payload.transaction_id,
                payload.status
            );
            return Ok(WebhookOutcome::skipped("webhook already processed", started));
        }

        // Step 3: verify the signature, then record the delivery attempt
        // before acting on the result, so rejected deliveries are
        // auditable too.
        let signature = header_signature.or(payload.signature.as_deref());
        let check = pontos_core::verify_signature(
            self.secret.as_deref(),
            raw_body,
            signature,
            self.allow_unsigned,
        );

        let log = self
            .logs
            .create(&NewWebhookLog {
                webhook_id: payload.webhook_id.clone(),
                transaction_id: payload.transaction_id.clone(),
                external_id: Some(payload.external_id.clone()),
                status: payload.status.clone(),
                payload: serde_json::to_value(&payload)
                    .unwrap_or_else(|_| json!({ "error": "unserializable payload" })),
                signature: signature.map(str::to_string),
                is_valid: check.is_valid,
                error_message: check.reason.clone(),
            })
            .await?;

        // Step 4: reject invalid signatures.
        if !check.is_valid {
            let reason = check
                .reason
                .unwrap_or_else(|| "invalid signature".to_string());
            tracing::warn!(
                "Rejected webhook for transaction {}: {}",
                payload.transaction_id,
                reason
            );
            self.finalize(log.id, false, Some(reason.clone()), started).await;
            return Err(AppError::SignatureRejected(reason));
        }

        // Steps 5-9 run behind the audit row: any failure is recorded on
        // the log and surfaces as an error the gateway will retry.
        match self.reconcile(&payload).await {
            Ok((order_id, processed, message)) => {
                let processing_time_ms = self.finalize(log.id, true, None, started).await;
                Ok(WebhookOutcome {
                    success: true,
                    message,
                    order_id: Some(order_id),
                    processed,
                    processing_time_ms,
                    webhook_log_id: Some(log.id),
                })
            }
            Err(err) => {
                // The row is finalized invalid on any failure: only logs
                // of successfully processed deliveries may anchor the
                // (transaction, status) idempotency check, otherwise the
                // gateway's retry of this delivery would be suppressed.
                self.finalize(log.id, false, Some(err.to_string()), started)
                    .await;
                Err(err)
            }
        }
    }

    /// Steps 5-9: order lookup, transaction guard, mapping, dispatch.
    async fn reconcile(&self, payload: &WebhookPayload) -> Result<(Uuid, bool, String), AppError> {
        // Step 5: locate the order via externalId.
        let order_id = Uuid::parse_str(&payload.external_id).map_err(|_| {
            AppError::Validation(format!(
                "externalId '{}' is not a valid order id",
                payload.external_id
            ))
        })?;
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;

        // Step 6: the delivery must refer to the order's own gateway
        // transaction; anything else is a cross-wired replay.
        if order.gateway_transaction_id.as_deref() != Some(payload.transaction_id.as_str()) {
            return Err(AppError::Validation(format!(
                "Transaction id mismatch for order {}",
                order.id
            )));
        }

        // Step 7: canonical mapping, shared with the poll path.
        let mapped = OrderStatus::from_gateway(&payload.status);

        // Step 8: identical status is a processed no-op.
        if mapped == order.status {
            return Ok((order.id, false, "status unchanged".to_string()));
        }

        // Step 9: audit the transition, then dispatch on the new status.
        let metadata = json!({
            "webhook_id": payload.webhook_id,
            "gateway_status": payload.status,
            "previous_gateway_status": payload.previous_status,
            "tx_hash": payload.tx_hash,
            "gateway_updated_at": payload.updated_at,
        });
        let applied = self
            .applier
            .apply(
                &order,
                mapped,
                ChangedBy::AlfredWebhook,
                &format!("gateway reported {}", payload.status),
                Some(&payload.transaction_id),
                metadata,
            )
            .await?;

        let message = if applied.changed {
            format!("order updated to {:?}", applied.order.status)
        } else {
            "order already settled".to_string()
        };
        Ok((order.id, applied.changed, message))
    }

    /// The idempotency check: a known webhook id, or a valid log for the
    /// same (transaction, status) inside the replay window.
    async fn already_processed(&self, payload: &WebhookPayload) -> Result<bool, AppError> {
        if let Some(webhook_id) = payload.webhook_id.as_deref() {
            if self.logs.find_by_webhook_id(webhook_id).await?.is_some() {
                return Ok(true);
            }
        }

        let since = Utc::now() - Duration::minutes(self.replay_window_minutes);
        self.logs
            .exists_valid_recent(&payload.transaction_id, &payload.status, since)
            .await
    }

    /// Records the processing outcome on the log row. Best effort: a
    /// failure here must not mask the delivery's own result.
    async fn finalize(
        &self,
        log_id: Uuid,
        is_valid: bool,
        error_message: Option<String>,
        started: Instant,
    ) -> i64 {
        let processing_time_ms = elapsed_ms(started);
        if let Err(err) = self
            .logs
            .finalize(log_id, is_valid, error_message, processing_time_ms)
            .await
        {
            tracing::error!("Failed to finalize webhook log {}: {}", log_id, err);
        }
        processing_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Environment, GatewayConfig, WebhookConfig};
    use crate::models::{
        NewOrder, NewOrderStatusHistory, Order, OrderStatusHistory, PaymentMethod,
        PointsTransaction, TransactionType, UserBalance, WebhookLog,
    };
    use crate::repository::balances::MockUserBalanceRepository;
    use crate::repository::history::MockOrderStatusHistoryRepository;
    use crate::repository::orders::MockOrderRepository;
    use crate::repository::transactions::MockPointsTransactionRepository;
    use crate::repository::webhook_logs::MockWebhookLogRepository;
    use crate::repository::{
        OrderRepository, OrderStatusHistoryRepository, PointsTransactionRepository,
        UserBalanceRepository,
    };
    use crate::services::credit_points::CreditPointsService;
    use mockall::predicate::eq;
    use std::str::FromStr;

    const SECRET: &str = "webhook-secret";

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn test_config(enabled: bool, release_pending: bool) -> AppConfig {
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
                secret: Some(SECRET.to_string()),
                enabled,
                allow_unsigned: false,
                replay_window_minutes: 60,
            },
            release_pending_on_terminal_failure: release_pending,
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

    fn payload_for(order: &Order, status: &str) -> WebhookPayload {
        WebhookPayload {
            webhook_id: Some("wh_1".to_string()),
            transaction_id: "alfred_tx_1".to_string(),
            status: status.to_string(),
            previous_status: None,
            external_id: order.id.to_string(),
            amount: Some(order.total_amount.clone()),
            amount_type: Some("BRL".to_string()),
            payment_method: Some("PIX".to_string()),
            tx_hash: None,
            updated_at: Some(Utc::now()),
            metadata: None,
            signature: None,
        }
    }

    fn signed(payload: &WebhookPayload) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = pontos_core::compute_signature(SECRET, &body);
        (body, signature)
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

    fn saved_log(log: &NewWebhookLog) -> WebhookLog {
        WebhookLog {
            id: Uuid::new_v4(),
            webhook_id: log.webhook_id.clone(),
            transaction_id: log.transaction_id.clone(),
            external_id: log.external_id.clone(),
            status: log.status.clone(),
            payload: log.payload.clone(),
            signature: log.signature.clone(),
            is_valid: log.is_valid,
            error_message: log.error_message.clone(),
            processing_time_ms: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    fn saved_history(entry: &NewOrderStatusHistory) -> OrderStatusHistory {
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

    struct Mocks {
        logs: MockWebhookLogRepository,
        orders: MockOrderRepository,
        balances: MockUserBalanceRepository,
        transactions: MockPointsTransactionRepository,
        history: MockOrderStatusHistoryRepository,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                logs: MockWebhookLogRepository::new(),
                orders: MockOrderRepository::new(),
                balances: MockUserBalanceRepository::new(),
                transactions: MockPointsTransactionRepository::new(),
                history: MockOrderStatusHistoryRepository::new(),
            }
        }

        fn fresh_delivery(&mut self) {
            self.logs.expect_find_by_webhook_id().returning(|_| Ok(None));
            self.logs
                .expect_exists_valid_recent()
                .returning(|_, _, _| Ok(false));
            self.logs.expect_create().returning(|log| Ok(saved_log(log)));
            self.logs
                .expect_finalize()
                .returning(|_, _, _, _| Ok(()));
        }

        fn into_service(self, config: &AppConfig) -> WebhookService {
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
                config,
            ));
            WebhookService::new(Arc::new(self.logs), orders, applier, config)
        }
    }

    #[tokio::test]
    async fn test_completed_webhook_credits_points() {
        let order = pending_order();
        let payload = payload_for(&order, "COMPLETED");
        let (body, signature) = signed(&payload);
        let entry = pending_entry(&order);
        let balance = balance_with_pending(&order);

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        {
            let order = order.clone();
            // Loaded once by the webhook flow and once by CreditPoints.
            mocks
                .orders
                .expect_find_by_id()
                .with(eq(order.id))
                .times(2)
                .returning(move |_| Ok(Some(order.clone())));
        }
        // Audit rows: the webhook transition and the credit completion.
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
                .times(1)
                .returning(move |_| Ok(Some(credited.clone())));
        }
        {
            let converted = balance
                .convert_pending_to_available(&order.points_amount)
                .unwrap();
            mocks
                .balances
                .expect_convert_pending_to_available()
                .with(eq(order.user_id), eq(order.points_amount.clone()))
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

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.processed);
        assert_eq!(outcome.order_id, Some(order.id));
        assert!(outcome.webhook_log_id.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_webhook_id_is_not_reprocessed() {
        let order = pending_order();
        let payload = payload_for(&order, "COMPLETED");
        let (body, signature) = signed(&payload);

        let mut mocks = Mocks::new();
        {
            let existing = saved_log(&NewWebhookLog {
                webhook_id: payload.webhook_id.clone(),
                transaction_id: payload.transaction_id.clone(),
                external_id: Some(payload.external_id.clone()),
                status: payload.status.clone(),
                payload: serde_json::json!({}),
                signature: None,
                is_valid: true,
                error_message: None,
            });
            mocks
                .logs
                .expect_find_by_webhook_id()
                .with(eq("wh_1"))
                .times(1)
                .returning(move |_| Ok(Some(existing.clone())));
        }
        // No log creation, no order access, no ledger movement: the mocks
        // would panic on any unexpected call.

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(!outcome.processed);
        assert_eq!(outcome.message, "webhook already processed");
    }

    #[tokio::test]
    async fn test_replayed_transaction_status_within_window_is_duplicate() {
        let order = pending_order();
        let mut payload = payload_for(&order, "COMPLETED");
        payload.webhook_id = None;
        let (body, signature) = signed(&payload);

        let mut mocks = Mocks::new();
        mocks
            .logs
            .expect_exists_valid_recent()
            .withf(|transaction_id, status, _| {
                transaction_id == "alfred_tx_1" && status == "COMPLETED"
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(!outcome.processed);
    }

    #[tokio::test]
    async fn test_invalid_signature_is_rejected_but_audited() {
        let order = pending_order();
        let payload = payload_for(&order, "COMPLETED");
        let body = serde_json::to_vec(&payload).unwrap();
        let bad_signature = pontos_core::compute_signature("wrong-secret", &body);

        let mut mocks = Mocks::new();
        mocks.logs.expect_find_by_webhook_id().returning(|_| Ok(None));
        mocks
            .logs
            .expect_exists_valid_recent()
            .returning(|_, _, _| Ok(false));
        // The attempt is persisted with is_valid = false before rejection.
        mocks
            .logs
            .expect_create()
            .withf(|log| !log.is_valid && log.error_message.is_some())
            .times(1)
            .returning(|log| Ok(saved_log(log)));
        mocks
            .logs
            .expect_finalize()
            .withf(|_, is_valid, _, _| !*is_valid)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let err = service
            .process(&body, Some(&bad_signature), payload)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SignatureRejected(_)));
    }

    #[tokio::test]
    async fn test_unknown_order_is_rejected() {
        let order = pending_order();
        let payload = payload_for(&order, "COMPLETED");
        let (body, signature) = signed(&payload);

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        mocks.orders.expect_find_by_id().returning(|_| Ok(None));

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let err = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transaction_id_mismatch_is_rejected() {
        let order = pending_order();
        let mut payload = payload_for(&order, "COMPLETED");
        payload.transaction_id = "cross_wired_tx".to_string();
        let (body, signature) = signed(&payload);

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let err = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_same_status_is_processed_noop() {
        let order = pending_order();
        // PROCESSING maps to internal Pending, the order's current state.
        let payload = payload_for(&order, "PROCESSING");
        let (body, signature) = signed(&payload);

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(!outcome.processed);
        assert_eq!(outcome.message, "status unchanged");
    }

    #[tokio::test]
    async fn test_failed_status_updates_order_without_ledger_movement() {
        let order = pending_order();
        let payload = payload_for(&order, "FAILED");
        let (body, signature) = signed(&payload);

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }
        mocks
            .history
            .expect_create()
            .withf(|entry| {
                entry.new_status == OrderStatus::Failed
                    && entry.changed_by == crate::models::ChangedBy::AlfredWebhook
            })
            .times(1)
            .returning(|entry| Ok(saved_history(entry)));
        {
            let failed = Order {
                status: OrderStatus::Failed,
                ..order.clone()
            };
            mocks
                .orders
                .expect_transition_status()
                .with(eq(order.id), eq(OrderStatus::Failed))
                .times(1)
                .returning(move |_, _| Ok(Some(failed.clone())));
        }
        // Release policy is off: no balance or ledger expectations, any
        // call would panic.

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(outcome.processed);
    }

    #[tokio::test]
    async fn test_failed_status_releases_pending_when_policy_enabled() {
        let order = pending_order();
        let payload = payload_for(&order, "CANCELLED");
        let (body, signature) = signed(&payload);
        let entry = pending_entry(&order);

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }
        mocks
            .history
            .expect_create()
            .returning(|entry| Ok(saved_history(entry)));
        {
            let cancelled = Order {
                status: OrderStatus::Cancelled,
                ..order.clone()
            };
            mocks
                .orders
                .expect_transition_status()
                .returning(move |_, _| Ok(Some(cancelled.clone())));
        }
        {
            let entry = entry.clone();
            mocks
                .transactions
                .expect_find_pending_by_order_id()
                .returning(move |_| Ok(vec![entry.clone()]));
        }
        {
            let mut refunded = entry.clone();
            refunded.transaction_type = TransactionType::Refund;
            mocks
                .transactions
                .expect_mark_refunded()
                .with(eq(entry.id))
                .times(1)
                .returning(move |_| Ok(Some(refunded.clone())));
        }
        {
            let released = UserBalance {
                pending_points: dec("0"),
                total_points: dec("0"),
                ..balance_with_pending(&order)
            };
            mocks
                .balances
                .expect_release_pending()
                .with(eq(order.user_id), eq(order.points_amount.clone()))
                .times(1)
                .returning(move |_, _| Ok(Some(released.clone())));
        }

        let config = test_config(true, true);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(outcome.processed);
    }

    #[tokio::test]
    async fn test_disabled_webhooks_skip_without_side_effects() {
        let order = pending_order();
        let payload = payload_for(&order, "COMPLETED");
        let (body, signature) = signed(&payload);

        // No expectations at all: any repository call panics.
        let mocks = Mocks::new();
        let config = test_config(false, false);
        let service = mocks.into_service(&config);
        let outcome = service
            .process(&body, Some(&signature), payload)
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(!outcome.processed);
        assert_eq!(outcome.message, "webhooks are disabled");
    }

    #[tokio::test]
    async fn test_signature_in_body_is_accepted_when_header_missing() {
        let order = pending_order();
        let mut payload = payload_for(&order, "PROCESSING");
        // Sign the body exactly as it will arrive, signature included.
        payload.signature = None;
        let body_without_sig = serde_json::to_vec(&payload).unwrap();
        let signature = pontos_core::compute_signature(SECRET, &body_without_sig);
        payload.signature = Some(signature);
        let raw_body = body_without_sig;

        let mut mocks = Mocks::new();
        mocks.fresh_delivery();
        {
            let order = order.clone();
            mocks
                .orders
                .expect_find_by_id()
                .returning(move |_| Ok(Some(order.clone())));
        }

        let config = test_config(true, false);
        let service = mocks.into_service(&config);
        let outcome = service.process(&raw_body, None, payload).await.unwrap();
        assert!(outcome.success);
    }
}
