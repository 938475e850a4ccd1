//! Ledger poster port: signals the ledger service that an adjustment or
//! reversal journal entry is owed. The engine decides what to post, never how
//! the journal lines balance.

use crate::models::{DifferenceClassification, ReversalPair};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use tracing::instrument;
use uuid::Uuid;

#[async_trait]
pub trait LedgerPoster: Send + Sync {
    /// Requests a compensating adjustment entry for a committed difference.
    /// Returns the downstream journal entry reference.
    async fn post_adjustment(
        &self,
        classification: &DifferenceClassification,
        bank_transaction_id: Uuid,
    ) -> Result<String, AppError>;

    /// Requests a correcting reversal entry for a paired reversal whose
    /// original was already posted to the ledger.
    async fn post_reversal(&self, pair: &ReversalPair) -> Result<String, AppError>;
}

// ============================================================================
// HTTP implementation against the ledger service
// ============================================================================

#[derive(Debug, Serialize)]
struct AdjustmentRequest<'a> {
    bank_transaction_id: Uuid,
    difference_type: &'a str,
    amount: Decimal,
    notes: Option<&'a str>,
    tds_section: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ReversalRequest {
    reversal_transaction_id: Uuid,
    original_transaction_id: Uuid,
    paired_by: String,
}

#[derive(Debug, Deserialize)]
struct JournalEntryResponse {
    journal_entry_ref: String,
}

pub struct HttpLedgerPoster {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerPoster {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<String, AppError> {
        let response = self
            .client
            .traced_post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("ledger service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "ledger service returned {} for {}",
                response.status(),
                url
            )));
        }

        let entry: JournalEntryResponse = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("ledger service response malformed: {}", e)))?;
        Ok(entry.journal_entry_ref)
    }
}

#[async_trait]
impl LedgerPoster for HttpLedgerPoster {
    #[instrument(skip(self, classification), fields(bank_transaction_id = %bank_transaction_id))]
    async fn post_adjustment(
        &self,
        classification: &DifferenceClassification,
        bank_transaction_id: Uuid,
    ) -> Result<String, AppError> {
        let url = format!("{}/journal-entries/adjustments", self.base_url);
        let body = AdjustmentRequest {
            bank_transaction_id,
            difference_type: &classification.difference_type,
            amount: classification.difference_amount,
            notes: classification.notes.as_deref(),
            tds_section: classification.tds_section.as_deref(),
        };
        self.post_json(&url, &body).await
    }

    #[instrument(skip(self, pair), fields(reversal_transaction_id = %pair.reversal_transaction_id))]
    async fn post_reversal(&self, pair: &ReversalPair) -> Result<String, AppError> {
        let url = format!("{}/journal-entries/reversals", self.base_url);
        let body = ReversalRequest {
            reversal_transaction_id: pair.reversal_transaction_id,
            original_transaction_id: pair.original_transaction_id,
            paired_by: pair.paired_by.clone(),
        };
        self.post_json(&url, &body).await
    }
}
