//! Application layer: the payment orchestrator that validates
//! preconditions, drives the state machine, calls the gateway, and commits
//! the paired {payment, reservation} writes.

pub mod orchestrator;
