//! User balance model: the per-user points ledger aggregate.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

/// Represents a user's points balance.
///
/// Conservation invariant: `total_points == available_points +
/// pending_points`, all non-negative, checked on every construction. The
/// aggregate is only changed through the mutators below, each of which
/// returns a new validated snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    /// Unique identifier for this balance record.
    pub id: Uuid,
    pub user_id: Uuid,
    /// Points the user can spend now.
    pub available_points: BigDecimal,
    /// Points tied to unsettled orders.
    pub pending_points: BigDecimal,
    /// Always available + pending.
    pub total_points: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// Creates an empty balance for a user. Balances are created lazily on
    /// the user's first order.
    pub fn empty(user_id: Uuid, now: DateTime<Utc>) -> UserBalance {
        UserBalance {
            id: Uuid::new_v4(),
            user_id,
            available_points: BigDecimal::from(0),
            pending_points: BigDecimal::from(0),
            total_points: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the conservation invariant.
    pub fn validate(&self) -> Result<(), AppError> {
        let zero = BigDecimal::from(0);
        if self.available_points < zero || self.pending_points < zero || self.total_points < zero {
            return Err(AppError::Validation(
                "Balance fields must not be negative".to_string(),
            ));
        }
        if self.total_points != &self.available_points + &self.pending_points {
            return Err(AppError::Validation(
                "Balance total must equal available plus pending".to_string(),
            ));
        }
        Ok(())
    }

    /// Adds points to the pending bucket (order creation).
    pub fn add_pending(&self, amount: &BigDecimal) -> Result<UserBalance, AppError> {
        self.rebuild(
            self.available_points.clone(),
            &self.pending_points + amount,
        )
    }

    /// Moves points from pending to available.
    ///
    /// This is the only legal path from pending to spendable points; it
    /// runs as part of the order-completion unit.
    pub fn convert_pending_to_available(
        &self,
        amount: &BigDecimal,
    ) -> Result<UserBalance, AppError> {
        if amount > &self.pending_points {
            return Err(AppError::StateConflict(format!(
                "Insufficient pending points: requested {}, pending {}",
                amount, self.pending_points
            )));
        }
        self.rebuild(
            &self.available_points + amount,
            &self.pending_points - amount,
        )
    }

    /// Releases pending points that will never settle (terminal failure
    /// with the release policy enabled).
    pub fn release_pending(&self, amount: &BigDecimal) -> Result<UserBalance, AppError> {
        if amount > &self.pending_points {
            return Err(AppError::StateConflict(format!(
                "Insufficient pending points: requested {}, pending {}",
                amount, self.pending_points
            )));
        }
        self.rebuild(
            self.available_points.clone(),
            &self.pending_points - amount,
        )
    }

    /// Credits spendable points directly (flows outside the purchase
    /// reconciliation, e.g. an admin adjustment).
    pub fn credit_points(&self, amount: &BigDecimal) -> Result<UserBalance, AppError> {
        self.rebuild(
            &self.available_points + amount,
            self.pending_points.clone(),
        )
    }

    /// Debits spendable points directly.
    pub fn debit_points(&self, amount: &BigDecimal) -> Result<UserBalance, AppError> {
        if amount > &self.available_points {
            return Err(AppError::StateConflict(format!(
                "Insufficient available points: requested {}, available {}",
                amount, self.available_points
            )));
        }
        self.rebuild(
            &self.available_points - amount,
            self.pending_points.clone(),
        )
    }

    /// Builds the next snapshot, recomputing the total and re-validating.
    fn rebuild(
        &self,
        available_points: BigDecimal,
        pending_points: BigDecimal,
    ) -> Result<UserBalance, AppError> {
        let next = UserBalance {
            total_points: &available_points + &pending_points,
            available_points,
            pending_points,
            updated_at: Utc::now(),
            ..self.clone()
        };
        next.validate()?;
        Ok(next)
    }
}
