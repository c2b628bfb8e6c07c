use crate::domain::money::Amount;
use crate::domain::payment::GatewayTxnId;
use crate::domain::ports::{
    ConfirmRequest, GatewayCapture, GatewayClient, GatewayHandoff, GatewayOutcome, GatewayRefund,
    InitiateRequest, ReverseRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Connection settings for the external payment provider, injected at
/// construction. Never read from ambient process state.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub merchant_code: String,
    pub secret_key: String,
    /// Upper bound on one round trip; expiry resolves to `Indeterminate`.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pay.example.com/v1".to_string(),
            merchant_code: "MC-TEST".to_string(),
            secret_key: "test-secret".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Deterministic stand-in provider for the CLI driver.
///
/// Approves every request, mints sequential `SIMTX-n` tokens, and remembers
/// the initiated amount per token so confirm/reverse can echo it back.
#[derive(Clone)]
pub struct SimulatedGateway {
    config: GatewayConfig,
    seq: Arc<AtomicU64>,
    amounts: Arc<RwLock<HashMap<GatewayTxnId, Amount>>>,
}

impl SimulatedGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            seq: Arc::new(AtomicU64::new(0)),
            amounts: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl GatewayClient for SimulatedGateway {
    async fn initiate(&self, request: InitiateRequest) -> GatewayOutcome<GatewayHandoff> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let txn = GatewayTxnId::new(format!("SIMTX-{n}"));
        self.amounts.write().await.insert(txn.clone(), request.amount);
        debug!(key = %request.idempotency_key, %txn, "simulated initiate");
        GatewayOutcome::Success(GatewayHandoff {
            redirect_url: format!("{}/checkout/{txn}", self.config.base_url),
            txn,
        })
    }

    async fn confirm(&self, request: ConfirmRequest) -> GatewayOutcome<GatewayCapture> {
        match self.amounts.read().await.get(&request.txn) {
            Some(amount) => GatewayOutcome::Success(GatewayCapture {
                amount: *amount,
                approved_at: Utc::now(),
            }),
            None => GatewayOutcome::Rejected(format!("unknown transaction {}", request.txn)),
        }
    }

    async fn reverse(&self, request: ReverseRequest) -> GatewayOutcome<GatewayRefund> {
        match self.amounts.read().await.get(&request.txn) {
            Some(_) => GatewayOutcome::Success(GatewayRefund {
                amount: request.amount,
                reversed_at: Utc::now(),
            }),
            None => GatewayOutcome::Rejected(format!("unknown transaction {}", request.txn)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{IdempotencyKey, PaymentId};
    use crate::domain::reservation::ReservationId;
    use rust_decimal_macros::dec;

    fn initiate_request(reservation: u64, payment: u64) -> InitiateRequest {
        InitiateRequest {
            reservation: ReservationId(reservation),
            payment: PaymentId(payment),
            amount: Amount::new(dec!(50000)).unwrap(),
            idempotency_key: IdempotencyKey::derive(ReservationId(reservation), PaymentId(payment)),
        }
    }

    #[tokio::test]
    async fn test_simulated_gateway_mints_sequential_tokens() {
        let gateway = SimulatedGateway::new(GatewayConfig::default());

        let first = gateway.initiate(initiate_request(1, 1)).await;
        let second = gateway.initiate(initiate_request(2, 2)).await;

        let GatewayOutcome::Success(first) = first else {
            panic!("expected success");
        };
        let GatewayOutcome::Success(second) = second else {
            panic!("expected success");
        };
        assert_eq!(first.txn, GatewayTxnId::new("SIMTX-1"));
        assert_eq!(second.txn, GatewayTxnId::new("SIMTX-2"));
        assert!(first.redirect_url.ends_with("/checkout/SIMTX-1"));
    }

    #[tokio::test]
    async fn test_simulated_gateway_rejects_unknown_txn() {
        let gateway = SimulatedGateway::new(GatewayConfig::default());
        let outcome = gateway
            .confirm(ConfirmRequest {
                txn: GatewayTxnId::new("NOPE"),
                confirmation_token: "tok".to_string(),
                idempotency_key: IdempotencyKey::derive(ReservationId(1), PaymentId(1)),
            })
            .await;
        assert!(matches!(outcome, GatewayOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn test_simulated_gateway_echoes_initiated_amount_on_confirm() {
        let gateway = SimulatedGateway::new(GatewayConfig::default());
        let GatewayOutcome::Success(handoff) = gateway.initiate(initiate_request(1, 1)).await
        else {
            panic!("expected success");
        };

        let outcome = gateway
            .confirm(ConfirmRequest {
                txn: handoff.txn,
                confirmation_token: "tok".to_string(),
                idempotency_key: IdempotencyKey::derive(ReservationId(1), PaymentId(1)),
            })
            .await;
        let GatewayOutcome::Success(capture) = outcome else {
            panic!("expected success");
        };
        assert_eq!(capture.amount, Amount::new(dec!(50000)).unwrap());
    }
}
