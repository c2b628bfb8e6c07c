//! Payment lifecycle orchestration for a reservation platform.
//!
//! A booking moves through a multi-step, partially-external transaction
//! while a third-party gateway remains the source of truth for money
//! movement. This crate
//! implements the orchestrator that drives that lifecycle: the payment
//! state machine, compare-and-swap stores, the three-outcome gateway
//! contract, and atomic paired {payment, reservation} commits.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
