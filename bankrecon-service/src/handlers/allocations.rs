//! Allocation endpoints: apply payment slices to bills, list and clear them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{AllocateRequest, AllocationResponse, PaymentAllocationsResponse},
    middleware::CompanyContext,
    startup::AppState,
};

/// Apply a slice of a payment to a bill.
pub async fn allocate(
    State(state): State<AppState>,
    company: CompanyContext,
    Json(payload): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocationResponse>), AppError> {
    payload.validate()?;

    let (allocation, settlement) = state
        .allocator
        .allocate(
            company.company_id,
            payload.payment_id,
            payload.payment_amount,
            payload.bill_id,
            payload.bill_total,
            payload.amount,
            payload.allocation_date,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AllocationResponse {
            allocation: allocation.into(),
            bill: settlement.into(),
        }),
    ))
}

/// List allocations for a payment with the applied total.
pub async fn get_payment_allocations(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentAllocationsResponse>, AppError> {
    let (allocations, total_allocated) = state
        .allocator
        .payment_allocations(company.company_id, payment_id)
        .await?;

    Ok(Json(PaymentAllocationsResponse {
        payment_id,
        total_allocated,
        allocations: allocations.into_iter().map(Into::into).collect(),
    }))
}

/// Remove every allocation for a payment. Idempotent.
pub async fn unallocate_all(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .allocator
        .unallocate_all(company.company_id, payment_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
