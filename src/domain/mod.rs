//! Domain layer: money and identifier value objects, the payment state
//! machine, and the ports the application layer drives.

pub mod money;
pub mod payment;
pub mod ports;
pub mod reservation;
