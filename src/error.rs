use crate::domain::money::Amount;
use crate::domain::payment::{GatewayTxnId, PaymentId, PaymentStatus};
use crate::domain::reservation::{ReservationId, ReservationStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Top-level error for every payment operation.
///
/// The variants map to distinct caller contracts: `Precondition` definitely
/// did not happen, `Gateway` definitely failed at the provider,
/// `AmbiguousOutcome` is unknown and must not be retried naively, and
/// `ConcurrentModification` is always safe to retry from a fresh read.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("gateway rejected the request: {0}")]
    Gateway(String),

    #[error("gateway outcome unknown for payment {payment}; reconcile before retrying")]
    AmbiguousOutcome { payment: PaymentId },

    #[error("concurrent modification on payment {payment}: expected {expected}, found {actual}")]
    ConcurrentModification {
        payment: PaymentId,
        expected: PaymentStatus,
        actual: PaymentStatus,
    },

    #[error("concurrent modification on reservation {reservation}: expected {expected}, found {actual}")]
    ReservationConflict {
        reservation: ReservationId,
        expected: ReservationStatus,
        actual: ReservationStatus,
    },

    #[error("illegal transition for payment {payment}: {from} -> {to}")]
    IllegalTransition {
        payment: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("gateway transaction {txn} is already bound to payment {payment}")]
    GatewayTxnBound { txn: GatewayTxnId, payment: PaymentId },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local state does not permit the requested transition. Never reaches the
/// gateway and is surfaced to the caller as a client error.
#[derive(Error, Debug, PartialEq)]
pub enum PreconditionError {
    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    #[error("reservation {0} does not belong to the caller")]
    NotOwner(ReservationId),

    #[error("reservation {0} is not awaiting payment")]
    ReservationNotPayable(ReservationId),

    #[error("reservation {0} already has a payment in progress")]
    ActivePaymentExists(ReservationId),

    #[error("no payment found for gateway transaction {0}")]
    PaymentNotFound(GatewayTxnId),

    #[error("unknown payment {0}")]
    UnknownPayment(PaymentId),

    #[error("payment {0} is not awaiting confirmation")]
    PaymentNotConfirmable(PaymentId),

    #[error("payment {0} has no captured funds to reverse")]
    PaymentNotRefundable(PaymentId),

    #[error("payment {0} cannot be abandoned in its current state")]
    PaymentNotAbandonable(PaymentId),

    #[error("amount {requested} does not match the active payment's amount {active}")]
    AmountMismatch { requested: Amount, active: Amount },

    #[error("refund of {requested} exceeds captured amount {captured}")]
    RefundExceedsPayment { requested: Amount, captured: Amount },

    #[error("reversal window closed for reservation {0}")]
    ReversalWindowClosed(ReservationId),

    #[error("payment {0} is not flagged for reconciliation")]
    ReconciliationNotPending(PaymentId),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
