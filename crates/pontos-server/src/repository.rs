//! Repository traits and their PostgreSQL adapters.
//!
//! One trait per aggregate so the services depend on an abstraction and
//! can be exercised against mocks; one concrete adapter each, injected by
//! constructor. The load-bearing atomic operations (pending-to-available
//! conversion, guarded status transitions) are single guarded SQL
//! statements, not read-then-write sequences.

pub mod balances;
pub mod history;
pub mod orders;
pub mod transactions;
pub mod webhook_logs;

pub use balances::{PgUserBalanceRepository, UserBalanceRepository};
pub use history::{OrderStatusHistoryRepository, PgOrderStatusHistoryRepository};
pub use orders::{OrderRepository, PgOrderRepository};
pub use transactions::{PgPointsTransactionRepository, PointsTransactionRepository};
pub use webhook_logs::{PgWebhookLogRepository, WebhookLogRepository};
