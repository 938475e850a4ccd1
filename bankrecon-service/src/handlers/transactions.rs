//! Bank transaction ingest and lookup, scoped to the company from the
//! request context.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CreateTransactionRequest, TransactionResponse},
    middleware::CompanyContext,
    models::{BankTransaction, Direction, ReconStatus},
    services::ReconciliationStore,
    startup::AppState,
};

/// Ingest one statement line.
pub async fn create_transaction(
    State(state): State<AppState>,
    company: CompanyContext,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    payload.validate()?;

    let direction = Direction::parse(&payload.direction).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "direction must be 'debit' or 'credit', got '{}'",
            payload.direction
        ))
    })?;
    if payload.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "amount must be positive"
        )));
    }

    let transaction = BankTransaction {
        transaction_id: Uuid::new_v4(),
        company_id: company.company_id,
        bank_account_id: payload.bank_account_id,
        transaction_date: payload.transaction_date,
        description: payload.description,
        reference: payload.reference,
        cheque_number: payload.cheque_number,
        direction: direction.as_str().to_string(),
        amount: payload.amount,
        status: ReconStatus::Unreconciled.as_str().to_string(),
        created_utc: Utc::now(),
    };

    tracing::info!(
        transaction_id = %transaction.transaction_id,
        company_id = %company.company_id,
        direction = %transaction.direction,
        "Ingesting bank transaction"
    );

    let transaction = state.store.insert_transaction(transaction).await?;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// Get a bank transaction by ID.
pub async fn get_transaction(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .store
        .get_transaction(company.company_id, transaction_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Transaction {} not found", transaction_id))
        })?;

    Ok(Json(transaction.into()))
}
