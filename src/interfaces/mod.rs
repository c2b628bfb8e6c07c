//! Inbound/outbound adapters for the CLI driver.

pub mod csv;
