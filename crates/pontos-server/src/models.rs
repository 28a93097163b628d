//! Database models for Pontos.

pub mod order;
pub mod order_status_history;
pub mod points_transaction;
pub mod user_balance;
pub mod webhook_log;

pub use order::{NewOrder, Order, OrderStatus, PaymentMethod, PIX_EXPIRY_MINUTES};
pub use order_status_history::{ChangedBy, NewOrderStatusHistory, OrderStatusHistory};
pub use points_transaction::{NewPointsTransaction, PointsTransaction, TransactionType};
pub use user_balance::UserBalance;
pub use webhook_log::{NewWebhookLog, WebhookLog};
