// Purchase pricing arithmetic for Pontos
//
// Points are sold 1:1 against the requested currency amount, with a flat
// percentage service fee charged on top. All arithmetic runs on BigDecimal
// so that `total == requested + fee` holds exactly.

use std::str::FromStr;

use bigdecimal::BigDecimal;

/// Service fee charged on top of every purchase (5%).
const FEE_PERCENTAGE: &str = "0.05";

/// Minimum purchase amount in currency units.
const MIN_PURCHASE_AMOUNT: &str = "1.00";

/// Maximum purchase amount in currency units.
const MAX_PURCHASE_AMOUNT: &str = "10000.00";

/// Error raised when a purchase amount falls outside the accepted bounds.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Purchase amount must be between {min} and {max}, got {amount}")]
    AmountOutOfRange {
        amount: BigDecimal,
        min: BigDecimal,
        max: BigDecimal,
    },
}

/// A fully priced purchase: requested amount, fee, total charge and the
/// points credited once payment settles.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseQuote {
    pub requested_amount: BigDecimal,
    pub fee_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub points_amount: BigDecimal,
}

/// Returns the fee percentage applied to purchases.
pub fn fee_percentage() -> BigDecimal {
    BigDecimal::from_str(FEE_PERCENTAGE).unwrap()
}

/// Returns the minimum accepted purchase amount.
pub fn min_purchase_amount() -> BigDecimal {
    BigDecimal::from_str(MIN_PURCHASE_AMOUNT).unwrap()
}

/// Returns the maximum accepted purchase amount.
pub fn max_purchase_amount() -> BigDecimal {
    BigDecimal::from_str(MAX_PURCHASE_AMOUNT).unwrap()
}

/// Calculates the service fee for a purchase amount.
pub fn fee_for_amount(amount: &BigDecimal) -> BigDecimal {
    amount * fee_percentage()
}

/// Calculates the total charge for a purchase amount (amount + fee).
pub fn total_for_amount(amount: &BigDecimal) -> BigDecimal {
    amount + fee_for_amount(amount)
}

/// Calculates the points credited for a purchase amount (1:1 conversion).
pub fn points_for_amount(amount: &BigDecimal) -> BigDecimal {
    amount.clone()
}

/// Validates that a purchase amount is positive and within bounds.
pub fn validate_purchase_amount(amount: &BigDecimal) -> Result<(), PricingError> {
    let min = min_purchase_amount();
    let max = max_purchase_amount();

    if amount < &min || amount > &max {
        return Err(PricingError::AmountOutOfRange {
            amount: amount.clone(),
            min,
            max,
        });
    }

    Ok(())
}

/// Validates a purchase amount and returns the full price breakdown.
pub fn quote_purchase(amount: &BigDecimal) -> Result<PurchaseQuote, PricingError> {
    validate_purchase_amount(amount)?;

    Ok(PurchaseQuote {
        requested_amount: amount.clone(),
        fee_amount: fee_for_amount(amount),
        total_amount: total_for_amount(amount),
        points_amount: points_for_amount(amount),
    })
}
