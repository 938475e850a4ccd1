//! Integration tests for difference preview and classified commits.

mod common;

use common::spawn_app;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

fn dec(value: &serde_json::Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("expected decimal string")).unwrap()
}

#[tokio::test]
async fn gap_of_exactly_ten_needs_no_classification() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "100010", "2024-06-01", "NEFT COLLECTION", None)
        .await;

    let response = app
        .get(&format!(
            "/transactions/{}/difference-preview?candidate_amount=100000",
            txn
        ))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["requires_classification"], false);
    assert_eq!(dec(&body["difference_amount"]), Decimal::from(10));
    assert!(body.get("suggested_type").is_none());
}

#[tokio::test]
async fn gap_just_over_ten_needs_classification() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(
            Uuid::new_v4(),
            "credit",
            "100010.01",
            "2024-06-01",
            "NEFT COLLECTION",
            None,
        )
        .await;

    let response = app
        .get(&format!(
            "/transactions/{}/difference-preview?candidate_amount=100000",
            txn
        ))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["requires_classification"], true);
    assert_eq!(body["suggested_type"], "bank_interest");
}

#[tokio::test]
async fn credit_shortfall_presets_tds() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(
            Uuid::new_v4(),
            "credit",
            "98000",
            "2024-06-01",
            "NEFT ACME PROFESSIONAL FEES",
            None,
        )
        .await;

    let response = app
        .get(&format!(
            "/transactions/{}/difference-preview?candidate_amount=100000",
            txn
        ))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["requires_classification"], true);
    assert_eq!(body["suggested_type"], "tds_deducted");
    assert_eq!(dec(&body["difference_amount"]), Decimal::from(-2000));
}

#[tokio::test]
async fn debit_presets_follow_sign() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "debit", "10118", "2024-06-01", "NEFT VENDOR", None)
        .await;

    let response = app
        .get(&format!(
            "/transactions/{}/difference-preview?candidate_amount=10000",
            txn
        ))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["suggested_type"], "bank_charges");

    let txn = app
        .ingest_transaction(Uuid::new_v4(), "debit", "9950", "2024-06-01", "NEFT VENDOR", None)
        .await;
    let response = app
        .get(&format!(
            "/transactions/{}/difference-preview?candidate_amount=10000",
            txn
        ))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["suggested_type"], "round_off");
}

#[tokio::test]
async fn tds_commit_attaches_section_and_posts_adjustment() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(
            Uuid::new_v4(),
            "credit",
            "98000",
            "2024-06-01",
            "NEFT ACME PROFESSIONAL FEES",
            None,
        )
        .await;

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
                    "notes": "TDS on professional fees",
                    "tds_section": "194J",
                },
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["difference"]["difference_type"], "tds_deducted");
    assert_eq!(body["difference"]["tds_section"], "194J");
    assert_eq!(dec(&body["difference"]["difference_amount"]), Decimal::from(-2000));
    assert_eq!(
        body["journal_entry_ref"].as_str().unwrap(),
        format!("JE-{}", txn)
    );

    assert_eq!(app.poster.adjustment_count().await, 1);
}

#[tokio::test]
async fn commit_without_difference_posts_nothing() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "50000", "2024-06-01", "NEFT ACME", None)
        .await;

    let response = app.reconcile_plain(txn).await;
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body.get("difference").is_none());
    assert!(body.get("journal_entry_ref").is_none());
    assert_eq!(app.poster.adjustment_count().await, 0);
}

#[tokio::test]
async fn unknown_difference_type_is_rejected() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "credit", "98000", "2024-06-01", "NEFT ACME", None)
        .await;

    let response = app
        .post(
            &format!("/transactions/{}/reconcile", txn),
            &json!({
                "reconciled_type": "payment",
                "reconciled_id": Uuid::new_v4().to_string(),
                "reconciled_by": "anita",
                "difference": {
                    "difference_type": "goodwill_gesture",
                    "difference_amount": "-2000",
                },
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // The rejected commit must not have reconciled the transaction.
    let response = app.get(&format!("/transactions/{}", txn)).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unreconciled");
}

#[tokio::test]
async fn tds_section_is_discarded_for_non_tds_types() {
    let app = spawn_app().await;
    let txn = app
        .ingest_transaction(Uuid::new_v4(), "debit", "10118", "2024-06-01", "NEFT VENDOR", None)
        .await;

    let response = app
        .post(
            &format!("/transactions/{}/reconcile", txn),
            &json!({
                "reconciled_type": "vendor_payment",
                "reconciled_id": Uuid::new_v4().to_string(),
                "reconciled_by": "anita",
                "difference": {
                    "difference_type": "bank_charges",
                    "difference_amount": "118",
                    "tds_section": "194J",
                },
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["difference"].get("tds_section").is_none());
}
