//! Adapters behind the domain ports: the in-memory ledger and the
//! simulated gateway client.

pub mod gateway;
pub mod in_memory;
