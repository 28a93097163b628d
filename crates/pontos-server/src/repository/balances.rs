//! User balance repository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::UserBalance;

/// Persistence seam for the UserBalance aggregate.
///
/// The mutators are atomic single-statement read-modify-writes keyed by
/// `user_id`: two concurrent completions of the same order cannot
/// double-apply a conversion because the guard clause re-checks the
/// pending bucket inside the UPDATE itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserBalanceRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<UserBalance>, AppError>;
    /// Adds to the pending bucket, creating the balance row lazily on the
    /// user's first order.
    async fn add_pending(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<UserBalance, AppError>;
    /// Atomically moves points from pending to available. Returns `None`
    /// when the pending bucket cannot cover the amount.
    async fn convert_pending_to_available(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<UserBalance>, AppError>;
    /// Atomically removes points from the pending bucket (release policy).
    /// Returns `None` when the pending bucket cannot cover the amount.
    async fn release_pending(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<UserBalance>, AppError>;
    /// Credits spendable points directly (flows outside reconciliation).
    async fn credit_points(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<UserBalance, AppError>;
    /// Debits spendable points directly. Returns `None` on insufficient
    /// available points.
    async fn debit_points(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<UserBalance>, AppError>;
}

/// PostgreSQL adapter for the UserBalance aggregate.
pub struct PgUserBalanceRepository {
    pool: PgPool,
}

impl PgUserBalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserBalanceRepository for PgUserBalanceRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<UserBalance>, AppError> {
        let balance: Option<UserBalance> = sqlx::query_as(
            r#"
            SELECT id, user_id, available_points, pending_points, total_points,
                   created_at, updated_at
            FROM user_balances
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn add_pending(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<UserBalance, AppError> {
        let balance: UserBalance = sqlx::query_as(
            r#"
            INSERT INTO user_balances (id, user_id, available_points, pending_points, total_points)
            VALUES ($1, $2, 0, $3, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET pending_points = user_balances.pending_points + $3,
                          total_points = user_balances.total_points + $3,
                          updated_at = NOW()
            RETURNING id, user_id, available_points, pending_points, total_points,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn convert_pending_to_available(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<UserBalance>, AppError> {
        // The total is untouched: points only change bucket.
        let balance: Option<UserBalance> = sqlx::query_as(
            r#"
            UPDATE user_balances
            SET pending_points = pending_points - $2,
                available_points = available_points + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND pending_points >= $2
            RETURNING id, user_id, available_points, pending_points, total_points,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn release_pending(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<UserBalance>, AppError> {
        let balance: Option<UserBalance> = sqlx::query_as(
            r#"
            UPDATE user_balances
            SET pending_points = pending_points - $2,
                total_points = total_points - $2,
                updated_at = NOW()
            WHERE user_id = $1 AND pending_points >= $2
            RETURNING id, user_id, available_points, pending_points, total_points,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn credit_points(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<UserBalance, AppError> {
        let balance: UserBalance = sqlx::query_as(
            r#"
            INSERT INTO user_balances (id, user_id, available_points, pending_points, total_points)
            VALUES ($1, $2, $3, 0, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET available_points = user_balances.available_points + $3,
                          total_points = user_balances.total_points + $3,
                          updated_at = NOW()
            RETURNING id, user_id, available_points, pending_points, total_points,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn debit_points(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<UserBalance>, AppError> {
        let balance: Option<UserBalance> = sqlx::query_as(
            r#"
            UPDATE user_balances
            SET available_points = available_points - $2,
                total_points = total_points - $2,
                updated_at = NOW()
            WHERE user_id = $1 AND available_points >= $2
            RETURNING id, user_id, available_points, pending_points, total_points,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }
}
