//! Reconciliation ledger: the commit/unreconcile state machine.
//!
//! States per transaction: unreconciled -> reconciled -> unreconciled (the
//! cycle may repeat). The store provides the check-and-set guarantee; this
//! layer sequences the downstream adjustment posting so a commit is
//! all-or-nothing.

use crate::models::{DifferenceClassification, ReconciliationRecord};
use crate::services::metrics::record_reconciliation_operation;
use crate::services::posting::LedgerPoster;
use crate::services::store::ReconciliationStore;
use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct ReconciliationLedger {
    store: Arc<dyn ReconciliationStore>,
    poster: Arc<dyn LedgerPoster>,
}

impl ReconciliationLedger {
    pub fn new(store: Arc<dyn ReconciliationStore>, poster: Arc<dyn LedgerPoster>) -> Self {
        Self { store, poster }
    }

    /// Commits a reconciliation outcome for one transaction.
    ///
    /// The status transition is reserved first (one winner under concurrent
    /// callers); when a difference classification is attached the ledger
    /// poster is then signalled, and a posting failure unwinds the
    /// reservation before the error surfaces.
    #[instrument(skip(self, difference), fields(company_id = %company_id, transaction_id = %transaction_id))]
    pub async fn commit(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
        reconciled_type: &str,
        reconciled_id: &str,
        reconciled_by: &str,
        difference: Option<DifferenceClassification>,
    ) -> Result<ReconciliationRecord, AppError> {
        if reconciled_type.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "reconciled_type must not be empty"
            )));
        }
        if reconciled_by.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "reconciled_by must not be empty"
            )));
        }

        let record = ReconciliationRecord {
            transaction_id,
            company_id,
            reconciled_type: reconciled_type.to_string(),
            reconciled_id: reconciled_id.to_string(),
            reconciled_by: reconciled_by.to_string(),
            reconciled_utc: Utc::now(),
            difference,
            journal_entry_ref: None,
        };

        let mut record = match self.store.begin_commit(record).await {
            Ok(record) => record,
            Err(e) => {
                record_reconciliation_operation("commit", "rejected");
                return Err(e);
            }
        };

        if let Some(classification) = record.difference.clone() {
            match self
                .poster
                .post_adjustment(&classification, transaction_id)
                .await
            {
                Ok(journal_entry_ref) => {
                    self.store
                        .set_journal_entry_ref(company_id, transaction_id, &journal_entry_ref)
                        .await?;
                    record.journal_entry_ref = Some(journal_entry_ref);
                }
                Err(e) => {
                    warn!(error = %e, "Adjustment posting failed, unwinding commit");
                    self.store.unreconcile(company_id, transaction_id).await?;
                    record_reconciliation_operation("commit", "posting_failed");
                    return Err(e);
                }
            }
        }

        record_reconciliation_operation("commit", "ok");
        info!(
            reconciled_type = %record.reconciled_type,
            reconciled_id = %record.reconciled_id,
            has_difference = record.difference.is_some(),
            "Transaction reconciled"
        );

        Ok(record)
    }

    /// Returns the transaction to unreconciled. Safe to call when already
    /// unreconciled.
    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %transaction_id))]
    pub async fn unreconcile(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<(), AppError> {
        self.store.unreconcile(company_id, transaction_id).await?;
        record_reconciliation_operation("unreconcile", "ok");
        Ok(())
    }
}
