//! Reversal detection and pairing endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{PairReversalRequest, ReversalDetectionResponse, ReversalPairResponse},
    middleware::CompanyContext,
    services::ReconciliationStore,
    startup::AppState,
};

/// Scan a credit transaction for reversal phrasing and propose originals.
pub async fn reversal_detection(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<ReversalDetectionResponse>, AppError> {
    let transaction = state
        .store
        .get_transaction(company.company_id, transaction_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Transaction {} not found", transaction_id))
        })?;

    let detection = state.reversals.detect(&transaction).await?;

    Ok(Json(ReversalDetectionResponse {
        transaction_id,
        detected_pattern: detection.detected_pattern,
        suggested_originals: detection
            .suggested_originals
            .into_iter()
            .map(Into::into)
            .collect(),
    }))
}

/// Link a reversal credit to its original debit.
pub async fn pair_reversal(
    State(state): State<AppState>,
    company: CompanyContext,
    Json(payload): Json<PairReversalRequest>,
) -> Result<(StatusCode, Json<ReversalPairResponse>), AppError> {
    payload.validate()?;

    let outcome = state
        .reversals
        .pair(
            company.company_id,
            payload.reversal_transaction_id,
            payload.original_transaction_id,
            payload.original_was_posted_to_ledger,
            &payload.paired_by,
        )
        .await?;

    if let Some(ref warning) = outcome.warning {
        tracing::warn!(
            reversal_transaction_id = %payload.reversal_transaction_id,
            warning = %warning,
            "Reversal paired against a reconciled original"
        );
    }

    Ok((StatusCode::CREATED, Json(outcome.into())))
}
