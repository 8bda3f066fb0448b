//! One module per rule type. Each holds the typed, clamped parameters of the
//! rule and the pure comparison that turns observed metrics into an
//! [`Evaluation`](crate::Evaluation).

pub mod conversion_drop;
pub mod data_freshness;
pub mod refund_spike;
pub mod revenue_drop;
pub mod traffic_spike;
