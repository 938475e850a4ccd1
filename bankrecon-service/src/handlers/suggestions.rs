//! Suggestion and free-text candidate search endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{SearchQuery, SearchResponse, SuggestQuery, SuggestionsResponse},
    engine::scoring::default_tolerance,
    middleware::CompanyContext,
    services::ReconciliationStore,
    startup::AppState,
};

/// Ranked reconciliation candidates for one unreconciled transaction.
pub async fn get_suggestions(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(transaction_id): Path<Uuid>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let transaction = state
        .store
        .get_transaction(company.company_id, transaction_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Transaction {} not found", transaction_id))
        })?;

    let tolerance = query
        .tolerance
        .unwrap_or_else(|| default_tolerance(transaction.amount, &state.config.matching));

    let suggestions = state
        .suggestions
        .suggest(&transaction, query.tolerance, query.max_results)
        .await?;

    Ok(Json(SuggestionsResponse {
        transaction_id,
        tolerance,
        suggestions: suggestions.into_iter().map(Into::into).collect(),
    }))
}

/// Free-text fallback search over the candidate pool.
pub async fn search_candidates(
    State(state): State<AppState>,
    company: CompanyContext,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let candidates = state
        .suggestions
        .search(company.company_id, &query.q, query.amount_hint)
        .await?;

    Ok(Json(SearchResponse {
        candidates: candidates.into_iter().map(Into::into).collect(),
    }))
}
