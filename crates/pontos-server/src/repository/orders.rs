//! Order repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Order, OrderStatus};

/// Persistence seam for the Order aggregate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<Order, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError>;
    async fn find_by_user_id(&self, user_id: Uuid, limit: i64) -> Result<Vec<Order>, AppError>;
    async fn find_by_status(&self, status: OrderStatus, limit: i64)
        -> Result<Vec<Order>, AppError>;
    /// Orders still PENDING whose payment deadline has passed.
    async fn find_expired_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, AppError>;
    /// Writes a full order snapshot (gateway data, metadata, status).
    async fn update(&self, order: &Order) -> Result<Order, AppError>;
    /// Guarded status transition: only applies while the stored status is
    /// non-terminal, and returns the updated row. `None` means the guard
    /// rejected the write (the order already reached a terminal state),
    /// which makes concurrent completions race-safe at the storage layer.
    async fn transition_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Option<Order>, AppError>;
}

/// PostgreSQL adapter for the Order aggregate.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &Order) -> Result<Order, AppError> {
        let created: Order = sqlx::query_as(
            r#"
            INSERT INTO orders (id, user_id, requested_amount, fee_amount, total_amount,
                                points_amount, status, payment_method, gateway_transaction_id,
                                qr_code, qr_image_url, expires_at, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                      status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                      expires_at, metadata, created_at, updated_at
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.requested_amount)
        .bind(&order.fee_amount)
        .bind(&order.total_amount)
        .bind(&order.points_amount)
        .bind(order.status)
        .bind(order.payment_method)
        .bind(&order.gateway_transaction_id)
        .bind(&order.qr_code)
        .bind(&order.qr_image_url)
        .bind(order.expires_at)
        .bind(&order.metadata)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                   status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                   expires_at, metadata, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn find_by_user_id(&self, user_id: Uuid, limit: i64) -> Result<Vec<Order>, AppError> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                   status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                   expires_at, metadata, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn find_by_status(
        &self,
        status: OrderStatus,
        limit: i64,
    ) -> Result<Vec<Order>, AppError> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                   status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                   expires_at, metadata, created_at, updated_at
            FROM orders
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn find_expired_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, AppError> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                   status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                   expires_at, metadata, created_at, updated_at
            FROM orders
            WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn update(&self, order: &Order) -> Result<Order, AppError> {
        let updated: Order = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $2,
                gateway_transaction_id = $3,
                qr_code = $4,
                qr_image_url = $5,
                expires_at = $6,
                metadata = $7,
                updated_at = $8
            WHERE id = $1
            RETURNING id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                      status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                      expires_at, metadata, created_at, updated_at
            "#,
        )
        .bind(order.id)
        .bind(order.status)
        .bind(&order.gateway_transaction_id)
        .bind(&order.qr_code)
        .bind(&order.qr_image_url)
        .bind(order.expires_at)
        .bind(&order.metadata)
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order.id)))?;

        Ok(updated)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Option<Order>, AppError> {
        let updated: Option<Order> = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING id, user_id, requested_amount, fee_amount, total_amount, points_amount,
                      status, payment_method, gateway_transaction_id, qr_code, qr_image_url,
                      expires_at, metadata, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(new_status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }
}
