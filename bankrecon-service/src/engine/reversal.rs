//! Reversal pairing: flags credit transactions that look like reversals of
//! earlier debits, proposes originals, and links the pair.

use crate::config::MatchingConfig;
use crate::engine::scoring::{confidence_score, default_tolerance, match_reason};
use crate::services::metrics::record_reversal_pairing;
use crate::services::posting::LedgerPoster;
use crate::services::store::ReconciliationStore;
use chrono::Utc;
use regex::Regex;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::models::{
    BankTransaction, Direction, PairOutcome, ReconStatus, ReconciliationCandidate,
    ReversalDetection, ReversalPair, ScoredCandidate,
};

pub struct ReversalEngine {
    store: Arc<dyn ReconciliationStore>,
    poster: Arc<dyn LedgerPoster>,
    config: MatchingConfig,
    patterns: Vec<Regex>,
}

impl ReversalEngine {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        poster: Arc<dyn LedgerPoster>,
        config: MatchingConfig,
    ) -> Self {
        let patterns = config
            .reversal_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Skipping invalid reversal pattern");
                    None
                }
            })
            .collect();

        Self {
            store,
            poster,
            config,
            patterns,
        }
    }

    /// Scans a credit transaction's narration for reversal phrasing and
    /// proposes prior debits on the same account as candidate originals.
    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.transaction_id))]
    pub async fn detect(
        &self,
        transaction: &BankTransaction,
    ) -> Result<ReversalDetection, AppError> {
        if transaction.direction() != Direction::Credit {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Reversal detection applies to credit transactions"
            )));
        }

        let detected_pattern = self
            .patterns
            .iter()
            .find(|re| re.is_match(&transaction.description))
            .map(|re| re.as_str().to_string());

        let originals = self
            .store
            .list_reversal_originals(
                transaction.company_id,
                transaction.bank_account_id,
                transaction.transaction_date,
                self.config.reversal_lookback_days,
            )
            .await?;

        let tolerance = default_tolerance(transaction.amount, &self.config);
        let mut suggested: Vec<ScoredCandidate> = Vec::new();
        for original in originals {
            if original.transaction_id == transaction.transaction_id {
                continue;
            }
            let amount_difference = (transaction.amount - original.amount).abs();
            if amount_difference > tolerance {
                continue;
            }
            let date_distance_days = (transaction.transaction_date - original.transaction_date)
                .num_days()
                .abs();
            let score = confidence_score(
                amount_difference,
                tolerance,
                date_distance_days,
                self.config.reversal_lookback_days,
            );

            let mut reason = match_reason(amount_difference, date_distance_days);
            if reference_prefix_matches(
                transaction.reference.as_deref(),
                original.reference.as_deref(),
            ) {
                reason.push_str(", matching reference prefix");
            }

            let is_reconciled = original.status() == ReconStatus::Reconciled;
            let reconciled_type = if is_reconciled {
                self.store
                    .get_record(transaction.company_id, original.transaction_id)
                    .await?
                    .map(|record| record.reconciled_type)
            } else {
                None
            };

            suggested.push(ScoredCandidate {
                candidate: ReconciliationCandidate::ReversalOriginal {
                    transaction_id: original.transaction_id,
                    amount: original.amount,
                    transaction_date: original.transaction_date,
                    description: original.description.clone(),
                    is_reconciled,
                    reconciled_type,
                },
                score,
                amount_difference,
                date_distance_days,
                match_reason: reason,
            });
        }

        suggested.sort_by(|a, b| {
            a.amount_difference
                .cmp(&b.amount_difference)
                .then(a.date_distance_days.cmp(&b.date_distance_days))
        });
        suggested.truncate(self.config.suggestion_limit);

        Ok(ReversalDetection {
            detected_pattern,
            suggested_originals: suggested,
        })
    }

    /// Links a reversal credit to its original debit. Both transactions are
    /// cancelled; when the original was posted to the ledger a correcting
    /// reversal entry is requested, and a posting failure unwinds the pair.
    #[instrument(skip(self), fields(company_id = %company_id, reversal_transaction_id = %reversal_transaction_id, original_transaction_id = %original_transaction_id))]
    pub async fn pair(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
        original_transaction_id: Uuid,
        original_was_posted_to_ledger: bool,
        paired_by: &str,
    ) -> Result<PairOutcome, AppError> {
        if paired_by.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "paired_by must not be empty"
            )));
        }
        if reversal_transaction_id == original_transaction_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A transaction cannot reverse itself"
            )));
        }

        let reversal = self
            .store
            .get_transaction(company_id, reversal_transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Reversal transaction {} not found",
                    reversal_transaction_id
                ))
            })?;
        let original = self
            .store
            .get_transaction(company_id, original_transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Original transaction {} not found",
                    original_transaction_id
                ))
            })?;

        if reversal.direction() != Direction::Credit {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Reversal side must be a credit transaction"
            )));
        }
        if original.direction() != reversal.direction().opposite() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Paired transactions must have opposite directions"
            )));
        }
        if reversal.bank_account_id != original.bank_account_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Paired transactions must reference the same bank account"
            )));
        }
        if reversal.status() != ReconStatus::Unreconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Reversal transaction is {}, unreconcile it before pairing",
                reversal.status().as_str()
            )));
        }

        for transaction_id in [reversal_transaction_id, original_transaction_id] {
            if let Some(existing) = self.store.get_pair_for(company_id, transaction_id).await? {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction {} is already paired with {}",
                    transaction_id,
                    existing.original_transaction_id
                )));
            }
        }

        let prior_reconciliation = self
            .store
            .get_record(company_id, original_transaction_id)
            .await?;

        let pair = ReversalPair {
            reversal_transaction_id,
            original_transaction_id,
            company_id,
            original_was_posted_to_ledger,
            paired_by: paired_by.to_string(),
            paired_utc: Utc::now(),
            journal_entry_ref: None,
        };

        let mut pair = self.store.create_pair(pair).await?;

        if original_was_posted_to_ledger {
            match self.poster.post_reversal(&pair).await {
                Ok(journal_entry_ref) => {
                    self.store
                        .set_pair_journal_ref(company_id, reversal_transaction_id, &journal_entry_ref)
                        .await?;
                    pair.journal_entry_ref = Some(journal_entry_ref);
                }
                Err(e) => {
                    warn!(error = %e, "Reversal posting failed, unwinding pair");
                    self.store
                        .remove_pair(company_id, reversal_transaction_id)
                        .await?;
                    return Err(e);
                }
            }
        }

        record_reversal_pairing(original_was_posted_to_ledger);

        let warning = prior_reconciliation.map(|record| {
            format!(
                "Original transaction was reconciled to {} {} by {}; that reconciliation is flagged by this reversal and should be reviewed",
                record.reconciled_type, record.reconciled_id, record.reconciled_by
            )
        });

        Ok(PairOutcome { pair, warning })
    }
}

fn reference_prefix_matches(reversal_ref: Option<&str>, original_ref: Option<&str>) -> bool {
    match (reversal_ref, original_ref) {
        (Some(a), Some(b)) => {
            let a = a.trim().as_bytes();
            let b = b.trim().as_bytes();
            let prefix_len = 6.min(a.len()).min(b.len());
            prefix_len >= 4 && a[..prefix_len].eq_ignore_ascii_case(&b[..prefix_len])
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_prefix_requires_meaningful_overlap() {
        assert!(reference_prefix_matches(
            Some("UTR1234567"),
            Some("UTR1234890")
        ));
        assert!(!reference_prefix_matches(Some("UTR"), Some("UTR")));
        assert!(!reference_prefix_matches(Some("UTR1234"), None));
        assert!(!reference_prefix_matches(
            Some("ABCD1234"),
            Some("WXYZ1234")
        ));
    }
}
