//! Application layer containing the core business logic orchestration.
//!
//! This module defines the `PaymentEngine`, the primary entry point for
//! routing charges and managing recurring donations, together with the
//! explanation service, the subscription registry and the recurrence
//! scheduler it is built from.

pub mod cache;
pub mod engine;
pub mod explanation;
pub mod registry;
pub mod scheduler;
