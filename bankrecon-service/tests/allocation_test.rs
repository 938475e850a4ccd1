//! Integration tests for the allocation tracker.

mod common;

use common::spawn_app;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

fn dec(value: &serde_json::Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("expected decimal string")).unwrap()
}

fn allocate_body(
    payment_id: Uuid,
    payment_amount: &str,
    bill_id: Uuid,
    bill_total: &str,
    amount: &str,
) -> serde_json::Value {
    json!({
        "payment_id": payment_id,
        "payment_amount": payment_amount,
        "bill_id": bill_id,
        "bill_total": bill_total,
        "amount": amount,
        "allocation_date": "2024-06-01",
    })
}

#[tokio::test]
async fn partial_then_full_settlement() {
    let app = spawn_app().await;
    let payment = Uuid::new_v4();
    let bill = Uuid::new_v4();

    let response = app
        .post(
            "/allocations",
            &allocate_body(payment, "100000", bill, "60000", "30000"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["bill"]["status"], "partially_paid");
    assert_eq!(dec(&body["bill"]["allocated"]), Decimal::from(30_000));

    let response = app
        .post(
            "/allocations",
            &allocate_body(payment, "100000", bill, "60000", "30000"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["bill"]["status"], "paid");
    assert_eq!(dec(&body["bill"]["allocated"]), Decimal::from(60_000));
}

#[tokio::test]
async fn allocation_beyond_bill_total_is_rejected() {
    let app = spawn_app().await;
    let payment = Uuid::new_v4();
    let bill = Uuid::new_v4();

    let response = app
        .post(
            "/allocations",
            &allocate_body(payment, "100000", bill, "60000", "70000"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn allocation_beyond_payment_amount_is_rejected() {
    let app = spawn_app().await;
    let payment = Uuid::new_v4();

    let response = app
        .post(
            "/allocations",
            &allocate_body(payment, "50000", Uuid::new_v4(), "40000", "40000"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    // 40,000 of 50,000 used; another 20,000 would oversubscribe the payment.
    let response = app
        .post(
            "/allocations",
            &allocate_body(payment, "50000", Uuid::new_v4(), "30000", "20000"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);

    // Conservation: the total applied never exceeded the payment amount.
    let response = app.get(&format!("/allocations/{}", payment)).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(dec(&body["total_allocated"]) <= Decimal::from(50_000));
}

#[tokio::test]
async fn non_positive_allocation_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/allocations",
            &allocate_body(Uuid::new_v4(), "50000", Uuid::new_v4(), "40000", "0"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn payment_allocations_are_listed_with_total() {
    let app = spawn_app().await;
    let payment = Uuid::new_v4();
    let bill_a = Uuid::new_v4();
    let bill_b = Uuid::new_v4();

    app.post(
        "/allocations",
        &allocate_body(payment, "100000", bill_a, "60000", "60000"),
    )
    .await;
    app.post(
        "/allocations",
        &allocate_body(payment, "100000", bill_b, "50000", "25000"),
    )
    .await;

    let response = app.get(&format!("/allocations/{}", payment)).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["allocations"].as_array().unwrap().len(), 2);
    assert_eq!(dec(&body["total_allocated"]), Decimal::from(85_000));
}

#[tokio::test]
async fn unallocate_all_clears_the_payment() {
    let app = spawn_app().await;
    let payment = Uuid::new_v4();

    app.post(
        "/allocations",
        &allocate_body(payment, "100000", Uuid::new_v4(), "60000", "60000"),
    )
    .await;

    let response = app.delete(&format!("/allocations/{}", payment)).await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app.get(&format!("/allocations/{}", payment)).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["allocations"].as_array().unwrap().is_empty());
    assert_eq!(dec(&body["total_allocated"]), Decimal::ZERO);

    // Idempotent: clearing again is fine.
    let response = app.delete(&format!("/allocations/{}", payment)).await;
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn bill_can_be_settled_by_multiple_payments() {
    let app = spawn_app().await;
    let bill = Uuid::new_v4();

    let response = app
        .post(
            "/allocations",
            &allocate_body(Uuid::new_v4(), "40000", bill, "60000", "40000"),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["bill"]["status"], "partially_paid");

    let response = app
        .post(
            "/allocations",
            &allocate_body(Uuid::new_v4(), "20000", bill, "60000", "20000"),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["bill"]["status"], "paid");
    assert_eq!(dec(&body["bill"]["allocated"]), Decimal::from(60_000));
}
