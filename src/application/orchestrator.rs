use crate::domain::money::Amount;
use crate::domain::payment::{
    GatewayTxnId, IdempotencyKey, PaymentId, PaymentRecord, PaymentStatus,
};
use crate::domain::ports::{
    ConfirmRequest, GatewayClientBox, GatewayOutcome, InitiateRequest, PaymentStoreBox,
    ReservationGateBox, ReservationWrite, ReverseRequest, TransitionWrite,
};
use crate::domain::reservation::{Reservation, ReservationId, ReservationStatus, UserId};
use crate::error::{PaymentError, PreconditionError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How far ahead of the reservation's scheduled moment a reversal is still
/// allowed. Inside the lead time, `reverse` refuses without a gateway call.
#[derive(Debug, Clone, Copy)]
pub struct ReversalPolicy {
    pub lead_time: Duration,
}

impl Default for ReversalPolicy {
    fn default() -> Self {
        Self {
            lead_time: Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiateReceipt {
    pub payment: PaymentId,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmReceipt {
    pub payment: PaymentId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundReceipt {
    pub payment: PaymentId,
    pub refunded_amount: Amount,
}

/// Latest-payment view returned by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub payment: PaymentId,
    pub gateway_txn: Option<GatewayTxnId>,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentSummary {
    fn from(record: PaymentRecord) -> Self {
        Self {
            payment: record.id,
            gateway_txn: record.gateway_txn,
            amount: record.amount,
            status: record.status,
            needs_reconciliation: record.needs_reconciliation,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Definitive outcome of an ambiguous gateway call, established out of band
/// (provider dashboard, support channel, settlement file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileVerdict {
    /// The gateway did capture the funds.
    Captured,
    /// No captured funds remain at the gateway, either because it never
    /// captured or because the capture was reversed provider-side.
    NotCaptured,
}

/// Drives a payment attempt through its lifecycle against the gateway while
/// keeping the payment record and the reservation status consistent.
///
/// Every operation validates local preconditions before touching the
/// gateway, re-validates with CAS after the gateway returns, and commits
/// money-affecting {payment, reservation} writes as one atomic unit. No lock
/// is held across a gateway round trip.
pub struct PaymentOrchestrator {
    payments: PaymentStoreBox,
    reservations: ReservationGateBox,
    gateway: GatewayClientBox,
    policy: ReversalPolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        payments: PaymentStoreBox,
        reservations: ReservationGateBox,
        gateway: GatewayClientBox,
        policy: ReversalPolicy,
    ) -> Self {
        Self {
            payments,
            reservations,
            gateway,
            policy,
        }
    }

    /// Starts a payment attempt for a reservation awaiting payment.
    ///
    /// Creating the `Pending` record is the atomic single-open-record check:
    /// of two racing initiates exactly one creates a record, the other gets
    /// `ActivePaymentExists`. The record is also the durable marker that a
    /// gateway call was dispatched, committed before the call goes out.
    /// Retrying while a handoff is already outstanding replays the stored
    /// payload without a second gateway call.
    pub async fn initiate(
        &self,
        caller: UserId,
        reservation: ReservationId,
        amount: Amount,
    ) -> Result<InitiateReceipt> {
        let resv = self.owned_reservation(caller, reservation).await?;
        if resv.status != ReservationStatus::PendingPayment {
            return Err(PreconditionError::ReservationNotPayable(reservation).into());
        }

        // A capture can survive on a closed record when its gateway outcome
        // resolved after the record moved, so the reconciliation gate looks
        // at the latest record, open or not.
        if let Some(latest) = self.payments.latest_for_reservation(reservation).await? {
            if latest.needs_reconciliation {
                return Err(PaymentError::AmbiguousOutcome { payment: latest.id });
            }
        }
        if let Some(active) = self.payments.active_for_reservation(reservation).await? {
            if active.status == PaymentStatus::AwaitingConfirmation {
                if let Some(url) = active.redirect_url.clone() {
                    if active.amount != amount {
                        return Err(PreconditionError::AmountMismatch {
                            requested: amount,
                            active: active.amount,
                        }
                        .into());
                    }
                    debug!(payment = %active.id, "replaying existing handoff");
                    return Ok(InitiateReceipt {
                        payment: active.id,
                        redirect_url: url,
                    });
                }
            }
            return Err(PreconditionError::ActivePaymentExists(reservation).into());
        }

        let record = self.payments.create(reservation, amount).await?;
        let key = IdempotencyKey::derive(reservation, record.id);
        let outcome = self
            .gateway
            .initiate(InitiateRequest {
                reservation,
                payment: record.id,
                amount,
                idempotency_key: key,
            })
            .await;

        match outcome {
            GatewayOutcome::Success(handoff) => {
                let updated = self
                    .payments
                    .apply_transition(TransitionWrite {
                        gateway_txn: Some(handoff.txn.clone()),
                        redirect_url: Some(handoff.redirect_url.clone()),
                        ..TransitionWrite::new(
                            record.id,
                            PaymentStatus::Pending,
                            PaymentStatus::AwaitingConfirmation,
                        )
                    })
                    .await?;
                info!(payment = %updated.id, txn = %handoff.txn, %reservation, "payment initiated");
                Ok(InitiateReceipt {
                    payment: updated.id,
                    redirect_url: handoff.redirect_url,
                })
            }
            GatewayOutcome::Rejected(reason) => {
                self.payments
                    .apply_transition(TransitionWrite::new(
                        record.id,
                        PaymentStatus::Pending,
                        PaymentStatus::Failed,
                    ))
                    .await?;
                warn!(payment = %record.id, %reason, "gateway rejected initiation");
                Err(PaymentError::Gateway(reason))
            }
            GatewayOutcome::Indeterminate => {
                // Outcome unknown: the gateway may or may not have opened a
                // transaction. The record stays Pending and blocks fresh
                // attempts until reconciled.
                self.payments
                    .apply_transition(TransitionWrite {
                        needs_reconciliation: Some(true),
                        ..TransitionWrite::new(
                            record.id,
                            PaymentStatus::Pending,
                            PaymentStatus::Pending,
                        )
                    })
                    .await?;
                warn!(payment = %record.id, "initiation outcome unknown, reconciliation required");
                Err(PaymentError::AmbiguousOutcome { payment: record.id })
            }
        }
    }

    /// Confirms an awaiting payment with the payer's confirmation token.
    ///
    /// A record already `Completed` replays its receipt without calling the
    /// gateway. On gateway success, moving the payment to `Completed` and
    /// the reservation to `Confirmed` is one atomic commit. A capture whose
    /// record moved mid-flight is never dropped: a racing confirm gets the
    /// winner's receipt, and any other interleaving flags the record for
    /// reconciliation. An indeterminate outcome leaves the record awaiting,
    /// flagged, so no fresh initiate can slip in and double-charge.
    pub async fn confirm(
        &self,
        caller: UserId,
        txn: &GatewayTxnId,
        confirmation_token: &str,
    ) -> Result<ConfirmReceipt> {
        let record = self
            .payments
            .get_by_gateway_txn(txn)
            .await?
            .ok_or_else(|| PreconditionError::PaymentNotFound(txn.clone()))?;
        let resv = self.owned_reservation(caller, record.reservation).await?;

        if record.status == PaymentStatus::Completed {
            debug!(payment = %record.id, "confirm replayed for completed payment");
            return Ok(ConfirmReceipt {
                payment: record.id,
                amount: record.amount,
            });
        }
        if record.status != PaymentStatus::AwaitingConfirmation {
            return Err(PreconditionError::PaymentNotConfirmable(record.id).into());
        }

        let key = IdempotencyKey::derive(record.reservation, record.id);
        let outcome = self
            .gateway
            .confirm(ConfirmRequest {
                txn: txn.clone(),
                confirmation_token: confirmation_token.to_string(),
                idempotency_key: key,
            })
            .await;

        match outcome {
            GatewayOutcome::Success(capture) => {
                let write = TransitionWrite {
                    needs_reconciliation: Some(false),
                    reservation: Some(ReservationWrite {
                        reservation: resv.id,
                        expected: ReservationStatus::PendingPayment,
                        to: ReservationStatus::Confirmed,
                    }),
                    ..TransitionWrite::new(
                        record.id,
                        PaymentStatus::AwaitingConfirmation,
                        PaymentStatus::Completed,
                    )
                };
                match self.payments.apply_transition(write).await {
                    Ok(updated) => {
                        info!(payment = %updated.id, %txn, amount = %capture.amount, "payment completed");
                        Ok(ConfirmReceipt {
                            payment: updated.id,
                            amount: capture.amount,
                        })
                    }
                    Err(
                        PaymentError::ConcurrentModification { .. }
                        | PaymentError::ReservationConflict { .. },
                    ) => self.captured_after_record_moved(record.id).await,
                    Err(other) => Err(other),
                }
            }
            GatewayOutcome::Rejected(reason) => {
                self.payments
                    .apply_transition(TransitionWrite {
                        needs_reconciliation: Some(false),
                        ..TransitionWrite::new(
                            record.id,
                            PaymentStatus::AwaitingConfirmation,
                            PaymentStatus::Failed,
                        )
                    })
                    .await?;
                warn!(payment = %record.id, %reason, "gateway rejected confirmation");
                Err(PaymentError::Gateway(reason))
            }
            GatewayOutcome::Indeterminate => {
                self.payments
                    .apply_transition(TransitionWrite {
                        needs_reconciliation: Some(true),
                        ..TransitionWrite::new(
                            record.id,
                            PaymentStatus::AwaitingConfirmation,
                            PaymentStatus::AwaitingConfirmation,
                        )
                    })
                    .await?;
                warn!(payment = %record.id, "confirmation outcome unknown, reconciliation required");
                Err(PaymentError::AmbiguousOutcome { payment: record.id })
            }
        }
    }

    /// Reverses a completed payment, cancelling the reservation.
    ///
    /// All preconditions, including the reversal window, are checked before
    /// any gateway call. The gateway request is keyed by the same derived
    /// idempotency reference as the original steps, so a retry after a
    /// rejected or indeterminate outcome is deduplicated provider-side and
    /// leaves local state untouched until a definitive success lands.
    pub async fn reverse(
        &self,
        caller: UserId,
        txn: &GatewayTxnId,
        amount: Amount,
    ) -> Result<RefundReceipt> {
        let record = self
            .payments
            .get_by_gateway_txn(txn)
            .await?
            .ok_or_else(|| PreconditionError::PaymentNotFound(txn.clone()))?;
        let resv = self.owned_reservation(caller, record.reservation).await?;

        if record.status == PaymentStatus::Refunded {
            debug!(payment = %record.id, "reverse replayed for refunded payment");
            return Ok(RefundReceipt {
                payment: record.id,
                refunded_amount: record.refunded_amount.unwrap_or(record.amount),
            });
        }
        if record.status != PaymentStatus::Completed {
            return Err(PreconditionError::PaymentNotRefundable(record.id).into());
        }
        if amount > record.amount {
            return Err(PreconditionError::RefundExceedsPayment {
                requested: amount,
                captured: record.amount,
            }
            .into());
        }
        if resv.scheduled_at - Utc::now() < self.policy.lead_time {
            return Err(PreconditionError::ReversalWindowClosed(resv.id).into());
        }

        let key = IdempotencyKey::derive(record.reservation, record.id);
        let outcome = self
            .gateway
            .reverse(ReverseRequest {
                txn: txn.clone(),
                amount,
                idempotency_key: key,
            })
            .await;

        match outcome {
            GatewayOutcome::Success(refund) => {
                let write = TransitionWrite {
                    refunded_amount: Some(refund.amount),
                    reservation: Some(ReservationWrite {
                        reservation: resv.id,
                        expected: ReservationStatus::Confirmed,
                        to: ReservationStatus::Cancelled,
                    }),
                    ..TransitionWrite::new(
                        record.id,
                        PaymentStatus::Completed,
                        PaymentStatus::Refunded,
                    )
                };
                match self.payments.apply_transition(write).await {
                    Ok(updated) => {
                        info!(payment = %updated.id, %txn, amount = %refund.amount, "payment refunded");
                        Ok(RefundReceipt {
                            payment: updated.id,
                            refunded_amount: refund.amount,
                        })
                    }
                    Err(
                        PaymentError::ConcurrentModification { .. }
                        | PaymentError::ReservationConflict { .. },
                    ) => {
                        // The refund went through at the provider; if a racing
                        // reverse already recorded it, replay that receipt.
                        // Otherwise flag the record until the books are squared.
                        let current = self
                            .payments
                            .get(record.id)
                            .await?
                            .ok_or(PreconditionError::UnknownPayment(record.id))?;
                        if current.status == PaymentStatus::Refunded {
                            debug!(payment = %current.id, "reverse lost the race to another reverse");
                            return Ok(RefundReceipt {
                                payment: current.id,
                                refunded_amount: current.refunded_amount.unwrap_or(current.amount),
                            });
                        }
                        self.payments
                            .apply_transition(TransitionWrite {
                                needs_reconciliation: Some(true),
                                ..TransitionWrite::new(current.id, current.status, current.status)
                            })
                            .await?;
                        warn!(payment = %current.id, "refunded at the provider but not recorded, reconciliation required");
                        Err(PaymentError::AmbiguousOutcome { payment: current.id })
                    }
                    Err(other) => Err(other),
                }
            }
            GatewayOutcome::Rejected(reason) => {
                warn!(payment = %record.id, %reason, "gateway rejected reversal");
                Err(PaymentError::Gateway(reason))
            }
            GatewayOutcome::Indeterminate => {
                warn!(payment = %record.id, "reversal outcome unknown, safe to retry");
                Err(PaymentError::AmbiguousOutcome { payment: record.id })
            }
        }
    }

    /// Marks an awaiting payment the payer walked away from as cancelled.
    /// No gateway call: nothing was captured. Idempotent on already
    /// cancelled records; refuses records flagged for reconciliation.
    pub async fn abandon(&self, caller: UserId, txn: &GatewayTxnId) -> Result<()> {
        let record = self
            .payments
            .get_by_gateway_txn(txn)
            .await?
            .ok_or_else(|| PreconditionError::PaymentNotFound(txn.clone()))?;
        self.owned_reservation(caller, record.reservation).await?;

        if record.status == PaymentStatus::Cancelled {
            return Ok(());
        }
        if record.needs_reconciliation {
            // An unresolved capture may exist; cancelling would orphan it.
            return Err(PaymentError::AmbiguousOutcome { payment: record.id });
        }
        if record.status != PaymentStatus::AwaitingConfirmation {
            return Err(PreconditionError::PaymentNotAbandonable(record.id).into());
        }

        self.payments
            .apply_transition(TransitionWrite::new(
                record.id,
                PaymentStatus::AwaitingConfirmation,
                PaymentStatus::Cancelled,
            ))
            .await?;
        info!(payment = %record.id, %txn, "payment abandoned by payer");
        Ok(())
    }

    /// Resolves a payment whose gateway outcome was indeterminate, once the
    /// true outcome has been established out of band. `Captured` commits the
    /// same atomic completed/confirmed pair a successful confirm would;
    /// `NotCaptured` fails the record, freeing the reservation for a fresh
    /// attempt.
    pub async fn reconcile(
        &self,
        payment: PaymentId,
        verdict: ReconcileVerdict,
    ) -> Result<PaymentRecord> {
        let record = self
            .payments
            .get(payment)
            .await?
            .ok_or(PreconditionError::UnknownPayment(payment))?;
        if !record.needs_reconciliation {
            return Err(PreconditionError::ReconciliationNotPending(payment).into());
        }

        let updated = match verdict {
            ReconcileVerdict::Captured => {
                // Funds can only have been captured after a handoff existed.
                if record.status != PaymentStatus::AwaitingConfirmation {
                    return Err(PreconditionError::PaymentNotConfirmable(payment).into());
                }
                self.payments
                    .apply_transition(TransitionWrite {
                        needs_reconciliation: Some(false),
                        reservation: Some(ReservationWrite {
                            reservation: record.reservation,
                            expected: ReservationStatus::PendingPayment,
                            to: ReservationStatus::Confirmed,
                        }),
                        ..TransitionWrite::new(
                            payment,
                            PaymentStatus::AwaitingConfirmation,
                            PaymentStatus::Completed,
                        )
                    })
                    .await?
            }
            ReconcileVerdict::NotCaptured => {
                // A flagged record may already be closed, as after an abandon
                // that raced an in-flight confirm. Clearing the flag is all
                // that is left to do there.
                let to = if record.status.is_open() {
                    PaymentStatus::Failed
                } else {
                    record.status
                };
                self.payments
                    .apply_transition(TransitionWrite {
                        needs_reconciliation: Some(false),
                        ..TransitionWrite::new(payment, record.status, to)
                    })
                    .await?
            }
        };
        info!(payment = %payment, status = %updated.status, "payment reconciled");
        Ok(updated)
    }

    /// Latest payment summary for the reservation, or `None` when no
    /// payment was ever attempted.
    pub async fn status(
        &self,
        caller: UserId,
        reservation: ReservationId,
    ) -> Result<Option<PaymentSummary>> {
        self.owned_reservation(caller, reservation).await?;
        Ok(self
            .payments
            .latest_for_reservation(reservation)
            .await?
            .map(PaymentSummary::from))
    }

    /// The gateway confirmed a capture, but the record moved while the call
    /// was in flight. If another confirm won the race, its receipt is
    /// replayed. Otherwise the funds are held at the provider with no live
    /// record, such as when an abandon slipped in mid-flight: the record is
    /// flagged so fresh attempts stay blocked until an operator reconciles.
    async fn captured_after_record_moved(&self, payment: PaymentId) -> Result<ConfirmReceipt> {
        let current = self
            .payments
            .get(payment)
            .await?
            .ok_or(PreconditionError::UnknownPayment(payment))?;
        if current.status == PaymentStatus::Completed {
            debug!(payment = %current.id, "confirm lost the race to another confirm");
            return Ok(ConfirmReceipt {
                payment: current.id,
                amount: current.amount,
            });
        }
        self.payments
            .apply_transition(TransitionWrite {
                needs_reconciliation: Some(true),
                ..TransitionWrite::new(current.id, current.status, current.status)
            })
            .await?;
        warn!(
            payment = %current.id,
            status = %current.status,
            "captured funds have no live record, reconciliation required"
        );
        Err(PaymentError::AmbiguousOutcome { payment: current.id })
    }

    async fn owned_reservation(
        &self,
        caller: UserId,
        reservation: ReservationId,
    ) -> Result<Reservation> {
        let resv = self
            .reservations
            .get(reservation)
            .await?
            .ok_or(PreconditionError::ReservationNotFound(reservation))?;
        if resv.owner != caller {
            return Err(PreconditionError::NotOwner(reservation).into());
        }
        Ok(resv)
    }
}
