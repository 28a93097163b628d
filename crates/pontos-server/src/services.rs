//! Use-case services for the purchase and reconciliation flows.
//!
//! Each service is constructed with the repository and gateway seams it
//! needs; nothing here touches the database or the network directly.
//! Both reconciliation paths (webhook push, status poll) funnel status
//! changes through the shared `TransitionApplier`, so the two paths can
//! never disagree on how an external status lands.

pub mod create_order;
pub mod credit_points;
pub mod poll;
pub mod transition;
pub mod webhook;

pub use create_order::CreateOrderService;
pub use credit_points::{CreditOutcome, CreditPointsService};
pub use poll::{PollOutcome, PollService};
pub use transition::{AppliedTransition, TransitionApplier};
pub use webhook::{WebhookOutcome, WebhookPayload, WebhookService};
