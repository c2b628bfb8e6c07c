mod common;

use common::*;
use resvpay::domain::payment::PaymentStatus;
use resvpay::domain::reservation::{ReservationId, ReservationStatus, UserId};
use resvpay::error::{PaymentError, PreconditionError};
use resvpay::infrastructure::in_memory::InMemoryLedger;

#[tokio::test]
async fn test_initiate_returns_handoff_and_awaits_confirmation() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    let receipt = orch
        .initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    assert!(receipt.redirect_url.contains("MOCKTX-1"));

    let record = latest_record(&ledger, 42).await;
    assert_eq!(record.status, PaymentStatus::AwaitingConfirmation);
    assert_eq!(record.amount, amount(50000));
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::PendingPayment);
}

#[tokio::test]
async fn test_confirm_completes_atomically() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    let txn = latest_txn(&ledger, 42).await;

    let receipt = orch.confirm(UserId(7), &txn, "pg-token").await.unwrap();
    assert_eq!(receipt.amount, amount(50000));

    assert_eq!(latest_record(&ledger, 42).await.status, PaymentStatus::Completed);
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn test_full_refund_cancels_reservation() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    let txn = latest_txn(&ledger, 42).await;
    orch.confirm(UserId(7), &txn, "pg-token").await.unwrap();

    let receipt = orch.reverse(UserId(7), &txn, amount(50000)).await.unwrap();
    assert_eq!(receipt.refunded_amount, amount(50000));

    let record = latest_record(&ledger, 42).await;
    assert_eq!(record.status, PaymentStatus::Refunded);
    assert_eq!(record.refunded_amount, Some(amount(50000)));
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn test_partial_refund_keeps_refunded_amount() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    let txn = latest_txn(&ledger, 42).await;
    orch.confirm(UserId(7), &txn, "pg-token").await.unwrap();

    let receipt = orch.reverse(UserId(7), &txn, amount(20000)).await.unwrap();
    assert_eq!(receipt.refunded_amount, amount(20000));
    assert_eq!(latest_record(&ledger, 42).await.refunded_amount, Some(amount(20000)));
}

#[tokio::test]
async fn test_rejected_initiation_fails_record_and_frees_slot() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    gateway.plan_initiate(Plan::Reject("card declined"));
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    let err = orch
        .initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(reason) if reason == "card declined"));

    assert_eq!(latest_record(&ledger, 42).await.status, PaymentStatus::Failed);
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::PendingPayment);

    // A fresh attempt supersedes the failed record.
    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    assert_eq!(ledger.records_for_reservation(ReservationId(42)).await.len(), 2);
}

#[tokio::test]
async fn test_rejected_confirmation_fails_record_and_keeps_reservation_payable() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    let txn = latest_txn(&ledger, 42).await;

    gateway.plan_confirm(Plan::Reject("insufficient balance"));
    let err = orch.confirm(UserId(7), &txn, "pg-token").await.unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(_)));

    assert_eq!(latest_record(&ledger, 42).await.status, PaymentStatus::Failed);
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::PendingPayment);

    // Confirming the dead record again is a precondition failure, not a
    // gateway call.
    let calls = gateway.confirm_calls();
    let err = orch.confirm(UserId(7), &txn, "pg-token").await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Precondition(PreconditionError::PaymentNotConfirmable(_))
    ));
    assert_eq!(gateway.confirm_calls(), calls);
}

#[tokio::test]
async fn test_rejected_reversal_leaves_states_unchanged() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    let txn = latest_txn(&ledger, 42).await;
    orch.confirm(UserId(7), &txn, "pg-token").await.unwrap();

    gateway.plan_reverse(Plan::Reject("settlement in progress"));
    let err = orch.reverse(UserId(7), &txn, amount(50000)).await.unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(_)));

    assert_eq!(latest_record(&ledger, 42).await.status, PaymentStatus::Completed);
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::Confirmed);

    // Retry after the rejection goes through.
    orch.reverse(UserId(7), &txn, amount(50000)).await.unwrap();
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn test_reverse_inside_lead_time_makes_no_gateway_call() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 2).await;
    let orch = orchestrator(&ledger, &gateway);

    orch.initiate(UserId(7), ReservationId(42), amount(50000))
        .await
        .unwrap();
    let txn = latest_txn(&ledger, 42).await;
    orch.confirm(UserId(7), &txn, "pg-token").await.unwrap();

    let err = orch.reverse(UserId(7), &txn, amount(50000)).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Precondition(PreconditionError::ReversalWindowClosed(_))
    ));
    assert_eq!(gateway.reverse_calls(), 0);
    assert_eq!(latest_record(&ledger, 42).await.status, PaymentStatus::Completed);
    assert_eq!(reservation_status(&ledger, 42).await, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn test_local_precondition_failures_never_reach_gateway() {
    let ledger = InMemoryLedger::new();
    let gateway = MockGateway::new();
    seed_reservation(&ledger, 42, 7, 48).await;
    let orch = orchestrator(&ledger, &gateway);

    // Wrong owner.
    assert!(matches!(
        orch.initiate(UserId(9), ReservationId(42), amount(50000))
            .await
            .unwrap_err(),
        PaymentError::Precondition(PreconditionError::NotOwner(_))
    ));
    // Unknown reservation.
    assert!(matches!(
        orch.initiate(UserId(7), ReservationId(99), amount(50000))
            .await
            .unwrap_err(),
        PaymentError::Precondition(PreconditionError::ReservationNotFound(_))
    ));
    assert_eq!(gateway.initiate_calls(), 0);
}
