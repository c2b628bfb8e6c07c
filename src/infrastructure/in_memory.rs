use crate::domain::money::Amount;
use crate::domain::payment::{GatewayTxnId, PaymentId, PaymentRecord, PaymentStatus};
use crate::domain::ports::{PaymentStore, ReservationGate, TransitionWrite};
use crate::domain::reservation::{Reservation, ReservationId, ReservationStatus};
use crate::error::{PaymentError, PreconditionError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory ledger holding payment records and reservations
/// under one lock, so paired {payment, reservation} commits are atomic and
/// no observer can see one side updated without the other.
///
/// Clones share state, so the same ledger can back both the `PaymentStore`
/// and the `ReservationGate` boxed ports.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    inner: Arc<RwLock<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    payments: HashMap<PaymentId, PaymentRecord>,
    by_txn: HashMap<GatewayTxnId, PaymentId>,
    reservations: HashMap<ReservationId, Reservation>,
    next_payment: u64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a reservation, replacing any previous entry with the same id.
    pub async fn insert_reservation(&self, reservation: Reservation) {
        let mut state = self.inner.write().await;
        state.reservations.insert(reservation.id, reservation);
    }

    /// All reservations, ordered by id. Driver/test convenience.
    pub async fn reservations(&self) -> Vec<Reservation> {
        let state = self.inner.read().await;
        let mut all: Vec<Reservation> = state.reservations.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Every record ever created for the reservation, ordered by id.
    pub async fn records_for_reservation(&self, reservation: ReservationId) -> Vec<PaymentRecord> {
        let state = self.inner.read().await;
        let mut records: Vec<PaymentRecord> = state
            .payments
            .values()
            .filter(|p| p.reservation == reservation)
            .cloned()
            .collect();
        records.sort_by_key(|p| p.id);
        records
    }
}

#[async_trait]
impl PaymentStore for InMemoryLedger {
    async fn create(&self, reservation: ReservationId, amount: Amount) -> Result<PaymentRecord> {
        let mut state = self.inner.write().await;
        // The open-record check and the insert happen under the same lock,
        // which is what makes exactly one of two racing initiates win.
        if state
            .payments
            .values()
            .any(|p| p.reservation == reservation && p.status.is_open())
        {
            return Err(PreconditionError::ActivePaymentExists(reservation).into());
        }
        state.next_payment += 1;
        let now = Utc::now();
        let record = PaymentRecord {
            id: PaymentId(state.next_payment),
            reservation,
            amount,
            status: PaymentStatus::Pending,
            gateway_txn: None,
            redirect_url: None,
            refunded_amount: None,
            needs_reconciliation: false,
            created_at: now,
            updated_at: now,
        };
        state.payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, payment: PaymentId) -> Result<Option<PaymentRecord>> {
        let state = self.inner.read().await;
        Ok(state.payments.get(&payment).cloned())
    }

    async fn get_by_gateway_txn(&self, txn: &GatewayTxnId) -> Result<Option<PaymentRecord>> {
        let state = self.inner.read().await;
        Ok(state
            .by_txn
            .get(txn)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn active_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> Result<Option<PaymentRecord>> {
        let state = self.inner.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.reservation == reservation && p.status.is_open())
            .cloned())
    }

    async fn latest_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> Result<Option<PaymentRecord>> {
        let state = self.inner.read().await;
        Ok(state
            .payments
            .values()
            .filter(|p| p.reservation == reservation)
            .max_by_key(|p| p.id)
            .cloned())
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<PaymentRecord> {
        let mut state = self.inner.write().await;

        // Validate everything before mutating anything, so a failed paired
        // write leaves both entities untouched.
        let record = state
            .payments
            .get(&write.payment)
            .ok_or(PreconditionError::UnknownPayment(write.payment))?;

        if record.status != write.expected {
            return Err(PaymentError::ConcurrentModification {
                payment: write.payment,
                expected: write.expected,
                actual: record.status,
            });
        }
        // Same-status writes carry flag updates only and are not transitions.
        if write.to != record.status && !record.status.can_transition_to(write.to) {
            return Err(PaymentError::IllegalTransition {
                payment: write.payment,
                from: record.status,
                to: write.to,
            });
        }
        if let Some(txn) = &write.gateway_txn {
            if let Some(existing) = &record.gateway_txn {
                if existing != txn {
                    return Err(PaymentError::GatewayTxnBound {
                        txn: existing.clone(),
                        payment: record.id,
                    });
                }
            } else if let Some(holder) = state.by_txn.get(txn) {
                return Err(PaymentError::GatewayTxnBound {
                    txn: txn.clone(),
                    payment: *holder,
                });
            }
        }
        if let Some(rw) = &write.reservation {
            let reservation = state.reservations.get(&rw.reservation).ok_or_else(|| {
                PaymentError::Storage(format!("reservation {} missing from ledger", rw.reservation))
            })?;
            if reservation.status != rw.expected {
                return Err(PaymentError::ReservationConflict {
                    reservation: rw.reservation,
                    expected: rw.expected,
                    actual: reservation.status,
                });
            }
        }

        if let Some(txn) = &write.gateway_txn {
            state.by_txn.insert(txn.clone(), write.payment);
        }
        let now = Utc::now();
        let record = state
            .payments
            .get_mut(&write.payment)
            .ok_or(PreconditionError::UnknownPayment(write.payment))?;
        record.status = write.to;
        record.updated_at = now;
        if write.gateway_txn.is_some() && record.gateway_txn.is_none() {
            record.gateway_txn = write.gateway_txn;
        }
        if let Some(url) = write.redirect_url {
            record.redirect_url = Some(url);
        }
        if let Some(amount) = write.refunded_amount {
            record.refunded_amount = Some(amount);
        }
        if let Some(flag) = write.needs_reconciliation {
            record.needs_reconciliation = flag;
        }
        let updated = record.clone();
        if let Some(rw) = write.reservation {
            let reservation = state.reservations.get_mut(&rw.reservation).ok_or_else(|| {
                PaymentError::Storage(format!("reservation {} missing from ledger", rw.reservation))
            })?;
            reservation.status = rw.to;
        }
        Ok(updated)
    }
}

#[async_trait]
impl ReservationGate for InMemoryLedger {
    async fn get(&self, reservation: ReservationId) -> Result<Option<Reservation>> {
        let state = self.inner.read().await;
        Ok(state.reservations.get(&reservation).cloned())
    }

    async fn set_status(
        &self,
        reservation: ReservationId,
        to: ReservationStatus,
        expected: ReservationStatus,
    ) -> Result<()> {
        let mut state = self.inner.write().await;
        let entry = state.reservations.get_mut(&reservation).ok_or(
            PreconditionError::ReservationNotFound(reservation),
        )?;
        if entry.status != expected {
            return Err(PaymentError::ReservationConflict {
                reservation,
                expected,
                actual: entry.status,
            });
        }
        entry.status = to;
        Ok(())
    }
}
