//! Integration tests for the reconciliation ledger state machine.

mod common;

use common::{spawn_app, RecordingPoster};
use bankrecon_service::models::{BankTransaction, DifferenceClassification, ReconStatus};
use bankrecon_service::services::store::ReconciliationStore;
use bankrecon_service::services::{MemoryStore, ReconciliationLedger};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

async fn transaction_status(app: &common::TestApp, transaction_id: Uuid) -> String {
    let response = app.get(&format!("/transactions/{}", transaction_id)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    body["status"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn commit_transitions_to_reconciled() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "50000", "2024-06-01", "NEFT ACME", None)
        .await;

    assert_eq!(transaction_status(&app, txn).await, "unreconciled");
    assert_eq!(app.reconcile_plain(txn).await.status().as_u16(), 201);
    assert_eq!(transaction_status(&app, txn).await, "reconciled");
}

#[tokio::test]
async fn second_commit_is_a_conflict() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "50000", "2024-06-01", "NEFT ACME", None)
        .await;

    assert_eq!(app.reconcile_plain(txn).await.status().as_u16(), 201);
    assert_eq!(app.reconcile_plain(txn).await.status().as_u16(), 409);
    assert_eq!(transaction_status(&app, txn).await, "reconciled");
}

#[tokio::test]
async fn unreconcile_is_idempotent() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "50000", "2024-06-01", "NEFT ACME", None)
        .await;

    assert_eq!(app.reconcile_plain(txn).await.status().as_u16(), 201);

    let response = app
        .post(&format!("/transactions/{}/unreconcile", txn), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(transaction_status(&app, txn).await, "unreconciled");

    // Second call is a no-op, not an error.
    let response = app
        .post(&format!("/transactions/{}/unreconcile", txn), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(transaction_status(&app, txn).await, "unreconciled");
}

#[tokio::test]
async fn commit_after_unreconcile_replaces_the_record() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "50000", "2024-06-01", "NEFT ACME", None)
        .await;

    assert_eq!(app.reconcile_plain(txn).await.status().as_u16(), 201);
    let response = app
        .post(&format!("/transactions/{}/unreconcile", txn), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(app.reconcile_plain(txn).await.status().as_u16(), 201);
    assert_eq!(transaction_status(&app, txn).await, "reconciled");
}

#[tokio::test]
async fn operations_on_unknown_transaction_are_not_found() {
    let app = spawn_app().await;
    let missing = Uuid::new_v4();

    assert_eq!(app.reconcile_plain(missing).await.status().as_u16(), 404);

    let response = app
        .post(&format!("/transactions/{}/unreconcile", missing), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn posting_failure_leaves_transaction_unreconciled() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "98000", "2024-06-01", "NEFT ACME", None)
        .await;

    app.poster.fail_next_call();
    let response = app
        .post(
            &format!("/transactions/{}/reconcile", txn),
            &json!({
                "reconciled_type": "payment",
                "reconciled_id": Uuid::new_v4().to_string(),
                "reconciled_by": "anita",
                "difference": {
                    "difference_type": "tds_deducted",
                    "difference_amount": "-2000",
                    "tds_section": "194J",
                },
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 502);

    // All-or-nothing: the failed commit left no reconciled state behind.
    assert_eq!(transaction_status(&app, txn).await, "unreconciled");
    assert_eq!(app.poster.adjustment_count().await, 0);

    // A retry after the upstream recovers succeeds.
    let response = app.reconcile_plain(txn).await;
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn concurrent_commits_have_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let poster = Arc::new(RecordingPoster::default());
    let ledger = ReconciliationLedger::new(store.clone(), poster);

    let company_id = Uuid::new_v4();
    let transaction_id = Uuid::new_v4();
    store
        .insert_transaction(BankTransaction {
            transaction_id,
            company_id,
            bank_account_id: Uuid::new_v4(),
            transaction_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            description: "NEFT ACME".to_string(),
            reference: None,
            cheque_number: None,
            direction: "credit".to_string(),
            amount: Decimal::from(50_000),
            status: ReconStatus::Unreconciled.as_str().to_string(),
            created_utc: Utc::now(),
        })
        .await
        .unwrap();

    let difference: Option<DifferenceClassification> = None;
    let (first, second) = tokio::join!(
        ledger.commit(
            company_id,
            transaction_id,
            "payment",
            "candidate-a",
            "anita",
            difference.clone(),
        ),
        ledger.commit(
            company_id,
            transaction_id,
            "payment",
            "candidate-b",
            "vivek",
            difference,
        ),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::Conflict(_))))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 1);

    // The transaction points at exactly one record, the winner's.
    let record = store
        .get_record(company_id, transaction_id)
        .await
        .unwrap()
        .expect("record must exist");
    let winner = outcomes
        .iter()
        .find_map(|r| r.as_ref().ok())
        .expect("one winner");
    assert_eq!(record.reconciled_id, winner.reconciled_id);

    let transaction = store
        .get_transaction(company_id, transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, "reconciled");
}
