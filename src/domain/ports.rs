use crate::domain::money::Amount;
use crate::domain::payment::{GatewayTxnId, IdempotencyKey, PaymentId, PaymentRecord, PaymentStatus};
use crate::domain::reservation::{Reservation, ReservationId, ReservationStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable store for payment records.
///
/// `create` and `apply_transition` are the only write paths. `create`
/// enforces, atomically, that at most one open record exists per
/// reservation; `apply_transition` is a compare-and-swap on the record's
/// status and carries the optional paired reservation write so both commit
/// as one unit.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Creates a new record in `Pending`. Fails with `ActivePaymentExists`
    /// when the reservation already has an open record.
    async fn create(&self, reservation: ReservationId, amount: Amount) -> Result<PaymentRecord>;

    async fn get(&self, payment: PaymentId) -> Result<Option<PaymentRecord>>;

    async fn get_by_gateway_txn(&self, txn: &GatewayTxnId) -> Result<Option<PaymentRecord>>;

    /// The reservation's open (`Pending`/`AwaitingConfirmation`) record, if any.
    async fn active_for_reservation(&self, reservation: ReservationId)
    -> Result<Option<PaymentRecord>>;

    /// The most recently created record for the reservation, open or not.
    async fn latest_for_reservation(&self, reservation: ReservationId)
    -> Result<Option<PaymentRecord>>;

    /// Compare-and-swap write. Fails with `ConcurrentModification` when the
    /// record's current status differs from `write.expected`, and with
    /// `ReservationConflict` when the paired reservation write loses its own
    /// CAS. On any failure nothing is mutated.
    async fn apply_transition(&self, write: TransitionWrite) -> Result<PaymentRecord>;
}

pub type PaymentStoreBox = Box<dyn PaymentStore>;

/// A single conditional write against one payment record, optionally paired
/// with a reservation status write applied in the same atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionWrite {
    pub payment: PaymentId,
    pub expected: PaymentStatus,
    pub to: PaymentStatus,
    /// Assigns the gateway token; only legal while the record has none.
    pub gateway_txn: Option<GatewayTxnId>,
    pub redirect_url: Option<String>,
    pub refunded_amount: Option<Amount>,
    pub needs_reconciliation: Option<bool>,
    pub reservation: Option<ReservationWrite>,
}

impl TransitionWrite {
    pub fn new(payment: PaymentId, expected: PaymentStatus, to: PaymentStatus) -> Self {
        Self {
            payment,
            expected,
            to,
            gateway_txn: None,
            redirect_url: None,
            refunded_amount: None,
            needs_reconciliation: None,
            reservation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationWrite {
    pub reservation: ReservationId,
    pub expected: ReservationStatus,
    pub to: ReservationStatus,
}

/// Read/write access to the reservation status field, as exposed by the
/// reservation-lifecycle collaborator.
#[async_trait]
pub trait ReservationGate: Send + Sync {
    async fn get(&self, reservation: ReservationId) -> Result<Option<Reservation>>;

    /// Same CAS discipline as [`PaymentStore::apply_transition`]. The
    /// orchestrator's own money-affecting writes go through the paired
    /// transition instead; this is for status-only updates.
    async fn set_status(
        &self,
        reservation: ReservationId,
        to: ReservationStatus,
        expected: ReservationStatus,
    ) -> Result<()>;
}

pub type ReservationGateBox = Box<dyn ReservationGate>;

/// Result of one gateway round trip.
///
/// The three-way split is the load-bearing contract of the whole system:
/// `Rejected` is a definitive negative, `Indeterminate` (timeout, transport
/// failure) is neither success nor failure and must never be collapsed into
/// either bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome<T> {
    Success(T),
    Rejected(String),
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    pub reservation: ReservationId,
    pub payment: PaymentId,
    pub amount: Amount,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmRequest {
    pub txn: GatewayTxnId,
    pub confirmation_token: String,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReverseRequest {
    pub txn: GatewayTxnId,
    pub amount: Amount,
    pub idempotency_key: IdempotencyKey,
}

/// Payload returned when the gateway accepts initiation: the transaction
/// token plus the checkout URL the payer is redirected to.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayHandoff {
    pub txn: GatewayTxnId,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCapture {
    pub amount: Amount,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRefund {
    pub amount: Amount,
    pub reversed_at: DateTime<Utc>,
}

/// The external payment provider's three operations. Pure I/O boundary; no
/// business rules. Every call runs under the client's configured timeout,
/// and a timeout resolves to `Indeterminate`, never to a silent retry.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn initiate(&self, request: InitiateRequest) -> GatewayOutcome<GatewayHandoff>;

    async fn confirm(&self, request: ConfirmRequest) -> GatewayOutcome<GatewayCapture>;

    async fn reverse(&self, request: ReverseRequest) -> GatewayOutcome<GatewayRefund>;
}

pub type GatewayClientBox = Box<dyn GatewayClient>;
