#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use resvpay::application::orchestrator::{PaymentOrchestrator, ReversalPolicy};
use resvpay::domain::money::Amount;
use resvpay::domain::payment::{GatewayTxnId, PaymentRecord};
use resvpay::domain::ports::{
    ConfirmRequest, GatewayCapture, GatewayClient, GatewayHandoff, GatewayOutcome, GatewayRefund,
    InitiateRequest, PaymentStore, ReservationGate, ReverseRequest,
};
use resvpay::domain::reservation::{Reservation, ReservationId, ReservationStatus, UserId};
use resvpay::infrastructure::in_memory::InMemoryLedger;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Scripted behavior for the next gateway call of a given operation.
/// Unscripted calls succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Succeed,
    Reject(&'static str),
    /// Timeout / transport failure: the outcome is unknown.
    Vanish,
}

#[derive(Default)]
struct MockState {
    seq: u64,
    amounts: HashMap<GatewayTxnId, Amount>,
    initiate_plans: VecDeque<Plan>,
    confirm_plans: VecDeque<Plan>,
    reverse_plans: VecDeque<Plan>,
    initiate_keys: Vec<String>,
    confirm_keys: Vec<String>,
    reverse_keys: Vec<String>,
}

/// Scripted gateway double: mints `MOCKTX-n` tokens, records every
/// idempotency key it is handed, and plays back queued outcome plans.
/// Clones share state so tests can inspect calls after handing a clone to
/// the orchestrator.
#[derive(Default, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
    delay: Option<std::time::Duration>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering, to widen race windows in concurrency tests.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn plan_initiate(&self, plan: Plan) {
        self.state.lock().unwrap().initiate_plans.push_back(plan);
    }

    pub fn plan_confirm(&self, plan: Plan) {
        self.state.lock().unwrap().confirm_plans.push_back(plan);
    }

    pub fn plan_reverse(&self, plan: Plan) {
        self.state.lock().unwrap().reverse_plans.push_back(plan);
    }

    pub fn initiate_calls(&self) -> usize {
        self.state.lock().unwrap().initiate_keys.len()
    }

    pub fn confirm_calls(&self) -> usize {
        self.state.lock().unwrap().confirm_keys.len()
    }

    pub fn reverse_calls(&self) -> usize {
        self.state.lock().unwrap().reverse_keys.len()
    }

    pub fn confirm_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().confirm_keys.clone()
    }

    pub fn reverse_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().reverse_keys.clone()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn initiate(&self, request: InitiateRequest) -> GatewayOutcome<GatewayHandoff> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state
            .initiate_keys
            .push(request.idempotency_key.as_str().to_string());
        match state.initiate_plans.pop_front().unwrap_or(Plan::Succeed) {
            Plan::Succeed => {
                state.seq += 1;
                let txn = GatewayTxnId::new(format!("MOCKTX-{}", state.seq));
                state.amounts.insert(txn.clone(), request.amount);
                GatewayOutcome::Success(GatewayHandoff {
                    redirect_url: format!("https://gw.test/checkout/{txn}"),
                    txn,
                })
            }
            Plan::Reject(reason) => GatewayOutcome::Rejected(reason.to_string()),
            Plan::Vanish => GatewayOutcome::Indeterminate,
        }
    }

    async fn confirm(&self, request: ConfirmRequest) -> GatewayOutcome<GatewayCapture> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state
            .confirm_keys
            .push(request.idempotency_key.as_str().to_string());
        match state.confirm_plans.pop_front().unwrap_or(Plan::Succeed) {
            Plan::Succeed => match state.amounts.get(&request.txn) {
                Some(amount) => GatewayOutcome::Success(GatewayCapture {
                    amount: *amount,
                    approved_at: Utc::now(),
                }),
                None => GatewayOutcome::Rejected("unknown transaction".to_string()),
            },
            Plan::Reject(reason) => GatewayOutcome::Rejected(reason.to_string()),
            Plan::Vanish => GatewayOutcome::Indeterminate,
        }
    }

    async fn reverse(&self, request: ReverseRequest) -> GatewayOutcome<GatewayRefund> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state
            .reverse_keys
            .push(request.idempotency_key.as_str().to_string());
        match state.reverse_plans.pop_front().unwrap_or(Plan::Succeed) {
            Plan::Succeed => match state.amounts.get(&request.txn) {
                Some(_) => GatewayOutcome::Success(GatewayRefund {
                    amount: request.amount,
                    reversed_at: Utc::now(),
                }),
                None => GatewayOutcome::Rejected("unknown transaction".to_string()),
            },
            Plan::Reject(reason) => GatewayOutcome::Rejected(reason.to_string()),
            Plan::Vanish => GatewayOutcome::Indeterminate,
        }
    }
}

pub fn amount(value: i64) -> Amount {
    Amount::new(value.into()).unwrap()
}

pub async fn seed_reservation(ledger: &InMemoryLedger, id: u64, owner: u64, hours_ahead: i64) {
    ledger
        .insert_reservation(Reservation {
            id: ReservationId(id),
            owner: UserId(owner),
            status: ReservationStatus::PendingPayment,
            scheduled_at: Utc::now() + Duration::hours(hours_ahead),
        })
        .await;
}

pub fn orchestrator(ledger: &InMemoryLedger, gateway: &MockGateway) -> PaymentOrchestrator {
    PaymentOrchestrator::new(
        Box::new(ledger.clone()),
        Box::new(ledger.clone()),
        Box::new(gateway.clone()),
        ReversalPolicy::default(),
    )
}

pub async fn latest_record(ledger: &InMemoryLedger, id: u64) -> PaymentRecord {
    ledger
        .latest_for_reservation(ReservationId(id))
        .await
        .unwrap()
        .expect("reservation has no payment record")
}

pub async fn latest_txn(ledger: &InMemoryLedger, id: u64) -> GatewayTxnId {
    latest_record(ledger, id)
        .await
        .gateway_txn
        .expect("payment has no gateway transaction")
}

pub async fn reservation_status(ledger: &InMemoryLedger, id: u64) -> ReservationStatus {
    ReservationGate::get(ledger, ReservationId(id))
        .await
        .unwrap()
        .expect("reservation not seeded")
        .status
}
