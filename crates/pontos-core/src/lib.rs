//! Pontos Core - pure pricing and webhook-signature logic
//!
//! This crate holds the side-effect-free pieces of the Pontos points
//! purchase system: purchase-amount pricing arithmetic and HMAC-based
//! webhook signature verification.

pub mod pricing;
pub mod signature;

pub use pricing::{quote_purchase, validate_purchase_amount, PricingError, PurchaseQuote};
pub use signature::{compute_signature, verify_signature, SignatureCheck};
