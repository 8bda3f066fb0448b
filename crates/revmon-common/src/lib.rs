//! Shared types for the revmon alerting workspace: rule definitions, alert
//! instances, AI insights and the id generator used to key them.

pub mod id;
pub mod types;
