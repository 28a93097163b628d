//! Order status history repository (append-only).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewOrderStatusHistory, OrderStatusHistory};

/// Persistence seam for the order audit trail. Rows are only appended.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStatusHistoryRepository: Send + Sync {
    async fn create(&self, entry: &NewOrderStatusHistory) -> Result<OrderStatusHistory, AppError>;
    async fn list_by_order_id(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, AppError>;
    /// Date-range query with pagination, oldest first.
    async fn list_by_order_id_between(
        &self,
        order_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OrderStatusHistory>, AppError>;
}

/// PostgreSQL adapter for the order audit trail.
pub struct PgOrderStatusHistoryRepository {
    pool: PgPool,
}

impl PgOrderStatusHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStatusHistoryRepository for PgOrderStatusHistoryRepository {
    async fn create(&self, entry: &NewOrderStatusHistory) -> Result<OrderStatusHistory, AppError> {
        let created: OrderStatusHistory = sqlx::query_as(
            r#"
            INSERT INTO order_status_history (id, order_id, previous_status, new_status,
                                              changed_by, reason, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, order_id, previous_status, new_status, changed_by, reason, metadata,
                      created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.order_id)
        .bind(entry.previous_status)
        .bind(entry.new_status)
        .bind(entry.changed_by)
        .bind(&entry.reason)
        .bind(&entry.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_by_order_id(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, AppError> {
        let entries: Vec<OrderStatusHistory> = sqlx::query_as(
            r#"
            SELECT id, order_id, previous_status, new_status, changed_by, reason, metadata,
                   created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn list_by_order_id_between(
        &self,
        order_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OrderStatusHistory>, AppError> {
        let entries: Vec<OrderStatusHistory> = sqlx::query_as(
            r#"
            SELECT id, order_id, previous_status, new_status, changed_by, reason, metadata,
                   created_at
            FROM order_status_history
            WHERE order_id = $1 AND created_at >= $2 AND created_at <= $3
            ORDER BY created_at ASC, id ASC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
