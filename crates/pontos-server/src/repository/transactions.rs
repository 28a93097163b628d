//! Points transaction repository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewPointsTransaction, PointsTransaction};

/// Persistence seam for points ledger entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PointsTransactionRepository: Send + Sync {
    async fn create(
        &self,
        transaction: &NewPointsTransaction,
    ) -> Result<PointsTransaction, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PointsTransaction>, AppError>;
    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Vec<PointsTransaction>, AppError>;
    /// The order's PENDING entries; completion requires exactly one.
    async fn find_pending_by_order_id(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<PointsTransaction>, AppError>;
    async fn find_recent_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>, AppError>;
    /// Guarded PENDING -> CREDIT transition. Returns `None` when the entry
    /// is no longer PENDING; this is the per-order exclusivity claim that
    /// makes crediting race-safe.
    async fn mark_credited(&self, id: Uuid) -> Result<Option<PointsTransaction>, AppError>;
    /// Guarded PENDING -> REFUND transition (release policy).
    async fn mark_refunded(&self, id: Uuid) -> Result<Option<PointsTransaction>, AppError>;
}

/// PostgreSQL adapter for points ledger entries.
pub struct PgPointsTransactionRepository {
    pool: PgPool,
}

impl PgPointsTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PointsTransactionRepository for PgPointsTransactionRepository {
    async fn create(
        &self,
        transaction: &NewPointsTransaction,
    ) -> Result<PointsTransaction, AppError> {
        let created: PointsTransaction = sqlx::query_as(
            r#"
            INSERT INTO points_transactions (id, user_id, order_id, transaction_type, amount,
                                             description, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, order_id, transaction_type, amount, description, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(transaction.user_id)
        .bind(transaction.order_id)
        .bind(transaction.transaction_type)
        .bind(&transaction.amount)
        .bind(&transaction.description)
        .bind(&transaction.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PointsTransaction>, AppError> {
        let transaction: Option<PointsTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, order_id, transaction_type, amount, description, metadata,
                   created_at, updated_at
            FROM points_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Vec<PointsTransaction>, AppError> {
        let transactions: Vec<PointsTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, order_id, transaction_type, amount, description, metadata,
                   created_at, updated_at
            FROM points_transactions
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn find_pending_by_order_id(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<PointsTransaction>, AppError> {
        let transactions: Vec<PointsTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, order_id, transaction_type, amount, description, metadata,
                   created_at, updated_at
            FROM points_transactions
            WHERE order_id = $1 AND transaction_type = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn find_recent_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>, AppError> {
        let transactions: Vec<PointsTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, order_id, transaction_type, amount, description, metadata,
                   created_at, updated_at
            FROM points_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn mark_credited(&self, id: Uuid) -> Result<Option<PointsTransaction>, AppError> {
        let updated: Option<PointsTransaction> = sqlx::query_as(
            r#"
            UPDATE points_transactions
            SET transaction_type = 'credit', updated_at = NOW()
            WHERE id = $1 AND transaction_type = 'pending'
            RETURNING id, user_id, order_id, transaction_type, amount, description, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn mark_refunded(&self, id: Uuid) -> Result<Option<PointsTransaction>, AppError> {
        let updated: Option<PointsTransaction> = sqlx::query_as(
            r#"
            UPDATE points_transactions
            SET transaction_type = 'refund', updated_at = NOW()
            WHERE id = $1 AND transaction_type = 'pending'
            RETURNING id, user_id, order_id, transaction_type, amount, description, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }
}
