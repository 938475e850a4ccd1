//! Reconciliation commit/unreconcile endpoints and the difference preview.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        DifferencePreviewQuery, DifferencePreviewResponse, ReconcileRequest,
        ReconciliationRecordResponse,
    },
    middleware::CompanyContext,
    services::ReconciliationStore,
    startup::AppState,
};

/// Preview whether the gap between the transaction and a chosen candidate
/// needs a difference classification, with the heuristic default type.
pub async fn difference_preview(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(transaction_id): Path<Uuid>,
    Query(query): Query<DifferencePreviewQuery>,
) -> Result<Json<DifferencePreviewResponse>, AppError> {
    if query.candidate_amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "candidate_amount must be positive"
        )));
    }

    let transaction = state
        .store
        .get_transaction(company.company_id, transaction_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Transaction {} not found", transaction_id))
        })?;

    let preset = state.classifier.preview(
        transaction.amount,
        query.candidate_amount,
        transaction.direction(),
    );

    Ok(Json(DifferencePreviewResponse {
        transaction_id,
        candidate_amount: query.candidate_amount,
        difference_amount: transaction.amount - query.candidate_amount,
        requires_classification: preset.is_some(),
        suggested_type: preset.map(|p| p.suggested_type.as_str()),
    }))
}

/// Commit a reconciliation outcome for the transaction.
pub async fn reconcile_transaction(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<ReconcileRequest>,
) -> Result<(StatusCode, Json<ReconciliationRecordResponse>), AppError> {
    payload.validate()?;

    let difference = match payload.difference {
        Some(d) => Some(state.classifier.confirm(
            &d.difference_type,
            d.difference_amount,
            d.notes,
            d.tds_section,
        )?),
        None => None,
    };

    let record = state
        .ledger
        .commit(
            company.company_id,
            transaction_id,
            &payload.reconciled_type,
            &payload.reconciled_id,
            &payload.reconciled_by,
            difference,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Return the transaction to unreconciled. Idempotent.
pub async fn unreconcile_transaction(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .ledger
        .unreconcile(company.company_id, transaction_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
