use crate::domain::money::Amount;
use crate::domain::reservation::ReservationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Locally generated payment attempt identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction token assigned by the gateway. Absent until the gateway has
/// responded to initiation; immutable once set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayTxnId(String);

impl GatewayTxnId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayTxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable reference sent with every gateway request so that a duplicate
/// network retry is deduplicated by the gateway itself. Derived from the
/// (reservation, payment) pair, never minted fresh on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(reservation: ReservationId, payment: PaymentId) -> Self {
        Self(format!("RESV-{reservation}-PAY-{payment}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a payment attempt.
///
/// Transitions are monotonic along the graph below; a record never reverts
/// to an earlier state. Terminal failures are superseded by a fresh record,
/// never reused.
///
/// ```text
/// Pending              -> AwaitingConfirmation | Failed
/// AwaitingConfirmation -> Completed | Failed | Cancelled
/// Completed            -> Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Initiated locally, gateway not yet confirmed.
    Pending,
    /// Gateway accepted initiation and returned a handoff token.
    AwaitingConfirmation,
    /// Gateway confirmed funds captured.
    Completed,
    /// Gateway rejected, or a local precondition failed.
    Failed,
    /// A completed payment was reversed.
    Refunded,
    /// An awaiting payment was abandoned by the payer.
    Cancelled,
}

impl PaymentStatus {
    /// Non-terminal states. At most one open record may exist per
    /// reservation at any time.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::AwaitingConfirmation)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, AwaitingConfirmation)
                | (Pending, Failed)
                | (AwaitingConfirmation, Completed)
                | (AwaitingConfirmation, Failed)
                | (AwaitingConfirmation, Cancelled)
                | (Completed, Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One payment attempt for a reservation and its status history head.
///
/// Owned exclusively by the orchestrator; all mutation goes through
/// [`PaymentStore::apply_transition`](crate::domain::ports::PaymentStore).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub reservation: ReservationId,
    pub amount: Amount,
    pub status: PaymentStatus,
    /// Set exactly once, when the gateway accepts initiation.
    pub gateway_txn: Option<GatewayTxnId>,
    /// The gateway's checkout handoff, kept so a retried initiate can return
    /// the original payload without a second gateway call.
    pub redirect_url: Option<String>,
    /// How much of `amount` was actually reversed, once refunded.
    pub refunded_amount: Option<Amount>,
    /// A gateway call for this record resolved `Indeterminate`; no fresh
    /// attempt is allowed until the true outcome is established.
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
