//! Suggestion engine: ranked reconciliation candidates for one transaction.

use crate::config::MatchingConfig;
use crate::engine::scoring::{confidence_score, default_tolerance, match_reason};
use crate::services::candidates::CandidateSource;
use crate::services::metrics::record_suggestion_request;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    BankTransaction, DateWindow, ReconStatus, ReconciliationCandidate, ScoredCandidate,
};

pub struct SuggestionEngine {
    source: Arc<dyn CandidateSource>,
    config: MatchingConfig,
}

impl SuggestionEngine {
    pub fn new(source: Arc<dyn CandidateSource>, config: MatchingConfig) -> Self {
        Self { source, config }
    }

    /// Ranked candidates for an unreconciled transaction.
    ///
    /// Candidates outside the amount tolerance are dropped; the rest are
    /// ordered by ascending absolute amount difference, then ascending date
    /// distance. An empty pool is an empty result, not an error.
    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.transaction_id))]
    pub async fn suggest(
        &self,
        transaction: &BankTransaction,
        tolerance: Option<Decimal>,
        max_results: Option<usize>,
    ) -> Result<Vec<ScoredCandidate>, AppError> {
        if transaction.status() != ReconStatus::Unreconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} is {}, suggestions apply to unreconciled transactions",
                transaction.transaction_id,
                transaction.status().as_str()
            )));
        }

        let tolerance =
            tolerance.unwrap_or_else(|| default_tolerance(transaction.amount, &self.config));
        if tolerance <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Tolerance must be positive"
            )));
        }
        let max_results = max_results.unwrap_or(self.config.suggestion_limit);

        let window = DateWindow::around(
            transaction.transaction_date,
            self.config.candidate_window_days,
        );
        let pool = self
            .source
            .list_candidates(transaction.company_id, transaction.direction(), window)
            .await?;

        record_suggestion_request(transaction.direction().as_str());

        let mut scored: Vec<ScoredCandidate> = pool
            .into_iter()
            .filter_map(|candidate| self.score_candidate(transaction, candidate, tolerance))
            .collect();

        scored.sort_by(|a, b| {
            a.amount_difference
                .cmp(&b.amount_difference)
                .then(a.date_distance_days.cmp(&b.date_distance_days))
        });
        scored.truncate(max_results);

        Ok(scored)
    }

    fn score_candidate(
        &self,
        transaction: &BankTransaction,
        candidate: ReconciliationCandidate,
        tolerance: Decimal,
    ) -> Option<ScoredCandidate> {
        let amount_difference = (transaction.amount - candidate.amount()).abs();
        if amount_difference > tolerance {
            return None;
        }

        let date_distance_days = (transaction.transaction_date - candidate.record_date())
            .num_days()
            .abs();
        let score = confidence_score(
            amount_difference,
            tolerance,
            date_distance_days,
            self.config.candidate_window_days,
        );

        Some(ScoredCandidate {
            match_reason: match_reason(amount_difference, date_distance_days),
            candidate,
            score,
            amount_difference,
            date_distance_days,
        })
    }

    /// Unscored free-text fallback for when automatic suggestions fail.
    ///
    /// Matches a lowercase substring against counterparty name, reference and
    /// description. An amount hint restricts the pool to 80%-120% of the hint
    /// before text filtering.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn search(
        &self,
        company_id: Uuid,
        query: &str,
        amount_hint: Option<Decimal>,
    ) -> Result<Vec<ReconciliationCandidate>, AppError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Search query must not be empty"
            )));
        }

        let amount_range = match amount_hint {
            Some(hint) if hint <= Decimal::ZERO => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Amount hint must be positive"
                )));
            }
            Some(hint) => Some((hint * Decimal::new(8, 1), hint * Decimal::new(12, 1))),
            None => None,
        };

        let pool = self
            .source
            .search_candidates(company_id, &needle, amount_range)
            .await?;

        let results = pool
            .into_iter()
            .filter(|candidate| matches_text(candidate, &needle))
            .take(self.config.search_limit)
            .collect();

        Ok(results)
    }
}

fn matches_text(candidate: &ReconciliationCandidate, needle: &str) -> bool {
    if candidate.counterparty().to_lowercase().contains(needle) {
        return true;
    }
    if let Some(reference) = candidate.reference() {
        if reference.to_lowercase().contains(needle) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn payment(name: &str, invoice: Option<&str>) -> ReconciliationCandidate {
        ReconciliationCandidate::Payment {
            payment_id: Uuid::new_v4(),
            party_name: name.to_string(),
            invoice_ref: invoice.map(|s| s.to_string()),
            amount: Decimal::from(1000),
            payment_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn text_match_covers_name_and_reference() {
        assert!(matches_text(&payment("Acme Traders", None), "acme"));
        assert!(matches_text(&payment("Acme Traders", Some("INV-042")), "inv-042"));
        assert!(!matches_text(&payment("Acme Traders", None), "globex"));
    }
}
