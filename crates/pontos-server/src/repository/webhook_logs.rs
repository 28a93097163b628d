//! Webhook log repository (append-only, plus finalization of a row's own
//! processing outcome).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewWebhookLog, WebhookLog};

/// Persistence seam for webhook delivery logs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookLogRepository: Send + Sync {
    async fn create(&self, log: &NewWebhookLog) -> Result<WebhookLog, AppError>;
    async fn find_by_webhook_id(&self, webhook_id: &str) -> Result<Option<WebhookLog>, AppError>;
    /// Whether a valid log for the same transaction and external status
    /// was recorded at or after `since` (the replay idempotency check).
    async fn exists_valid_recent(
        &self,
        transaction_id: &str,
        status: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError>;
    /// Records the final outcome of processing a delivery: validity,
    /// latency and any error message.
    async fn finalize(
        &self,
        id: Uuid,
        is_valid: bool,
        error_message: Option<String>,
        processing_time_ms: i64,
    ) -> Result<(), AppError>;
}

/// PostgreSQL adapter for webhook delivery logs.
pub struct PgWebhookLogRepository {
    pool: PgPool,
}

impl PgWebhookLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookLogRepository for PgWebhookLogRepository {
    async fn create(&self, log: &NewWebhookLog) -> Result<WebhookLog, AppError> {
        let created: WebhookLog = sqlx::query_as(
            r#"
            INSERT INTO webhook_logs (id, webhook_id, transaction_id, external_id, status,
                                      payload, signature, is_valid, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, webhook_id, transaction_id, external_id, status, payload, signature,
                      is_valid, error_message, processing_time_ms, processed_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&log.webhook_id)
        .bind(&log.transaction_id)
        .bind(&log.external_id)
        .bind(&log.status)
        .bind(&log.payload)
        .bind(&log.signature)
        .bind(log.is_valid)
        .bind(&log.error_message)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_webhook_id(&self, webhook_id: &str) -> Result<Option<WebhookLog>, AppError> {
        let log: Option<WebhookLog> = sqlx::query_as(
            r#"
            SELECT id, webhook_id, transaction_id, external_id, status, payload, signature,
                   is_valid, error_message, processing_time_ms, processed_at, created_at
            FROM webhook_logs
            WHERE webhook_id = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(webhook_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn exists_valid_recent(
        &self,
        transaction_id: &str,
        status: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM webhook_logs
                WHERE transaction_id = $1 AND status = $2 AND is_valid = TRUE
                  AND created_at >= $3
            )
            "#,
        )
        .bind(transaction_id)
        .bind(status)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn finalize(
        &self,
        id: Uuid,
        is_valid: bool,
        error_message: Option<String>,
        processing_time_ms: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE webhook_logs
            SET is_valid = $2,
                error_message = COALESCE($3, error_message),
                processing_time_ms = $4,
                processed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(is_valid)
        .bind(error_message)
        .bind(processing_time_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
