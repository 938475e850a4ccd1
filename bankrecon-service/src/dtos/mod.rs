//! Request/response DTOs for the HTTP surface.

use crate::models::{
    Allocation, BankTransaction, BillSettlement, DifferenceClassification, PairOutcome,
    ReconciliationCandidate, ReconciliationRecord, ScoredCandidate,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub bank_account_id: Uuid,
    pub transaction_date: NaiveDate,
    #[validate(length(min = 1, max = 512))]
    pub description: String,
    pub reference: Option<String>,
    pub cheque_number: Option<String>,
    pub direction: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub bank_account_id: Uuid,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub cheque_number: Option<String>,
    pub direction: String,
    pub amount: Decimal,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl From<BankTransaction> for TransactionResponse {
    fn from(t: BankTransaction) -> Self {
        Self {
            transaction_id: t.transaction_id,
            bank_account_id: t.bank_account_id,
            transaction_date: t.transaction_date,
            description: t.description,
            reference: t.reference,
            cheque_number: t.cheque_number,
            direction: t.direction,
            amount: t.amount,
            status: t.status,
            created_utc: t.created_utc,
        }
    }
}

// ============================================================================
// Suggestions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub tolerance: Option<Decimal>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CandidateDto {
    pub source: &'static str,
    pub record_id: Uuid,
    pub counterparty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    pub amount: Decimal,
    pub record_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tds_section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reconciled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled_type: Option<String>,
}

impl From<ReconciliationCandidate> for CandidateDto {
    fn from(candidate: ReconciliationCandidate) -> Self {
        let mut dto = Self {
            source: candidate.source_type(),
            record_id: candidate.record_id(),
            counterparty: candidate.counterparty().to_string(),
            reference: candidate.reference().map(|s| s.to_string()),
            record_type: None,
            amount: candidate.amount(),
            record_date: candidate.record_date(),
            tds_section: None,
            is_reconciled: None,
            reconciled_type: None,
        };
        match candidate {
            ReconciliationCandidate::Payment { .. } => {}
            ReconciliationCandidate::DebitRecord {
                record_type,
                tds_section,
                ..
            } => {
                dto.record_type = Some(record_type);
                dto.tds_section = tds_section;
            }
            ReconciliationCandidate::ReversalOriginal {
                is_reconciled,
                reconciled_type,
                ..
            } => {
                dto.is_reconciled = Some(is_reconciled);
                dto.reconciled_type = reconciled_type;
            }
        }
        dto
    }
}

#[derive(Debug, Serialize)]
pub struct SuggestionDto {
    #[serde(flatten)]
    pub candidate: CandidateDto,
    pub score: i32,
    pub band: &'static str,
    pub amount_difference: Decimal,
    pub date_distance_days: i64,
    pub match_reason: String,
}

impl From<ScoredCandidate> for SuggestionDto {
    fn from(scored: ScoredCandidate) -> Self {
        let band = scored.band().as_str();
        Self {
            band,
            score: scored.score,
            amount_difference: scored.amount_difference,
            date_distance_days: scored.date_distance_days,
            match_reason: scored.match_reason,
            candidate: scored.candidate.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub transaction_id: Uuid,
    pub tolerance: Decimal,
    pub suggestions: Vec<SuggestionDto>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub amount_hint: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub candidates: Vec<CandidateDto>,
}

// ============================================================================
// Difference classification
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DifferencePreviewQuery {
    pub candidate_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DifferencePreviewResponse {
    pub transaction_id: Uuid,
    pub candidate_amount: Decimal,
    pub difference_amount: Decimal,
    pub requires_classification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct DifferenceDto {
    pub difference_type: String,
    pub difference_amount: Decimal,
    pub notes: Option<String>,
    pub tds_section: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DifferenceResponse {
    pub difference_amount: Decimal,
    pub difference_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tds_section: Option<String>,
}

impl From<DifferenceClassification> for DifferenceResponse {
    fn from(d: DifferenceClassification) -> Self {
        Self {
            difference_amount: d.difference_amount,
            difference_type: d.difference_type,
            notes: d.notes,
            tds_section: d.tds_section,
        }
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ReconcileRequest {
    #[validate(length(min = 1, max = 64))]
    pub reconciled_type: String,
    #[validate(length(min = 1, max = 128))]
    pub reconciled_id: String,
    #[validate(length(min = 1, max = 128))]
    pub reconciled_by: String,
    pub difference: Option<DifferenceDto>,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationRecordResponse {
    pub transaction_id: Uuid,
    pub reconciled_type: String,
    pub reconciled_id: String,
    pub reconciled_by: String,
    pub reconciled_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<DifferenceResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_entry_ref: Option<String>,
}

impl From<ReconciliationRecord> for ReconciliationRecordResponse {
    fn from(r: ReconciliationRecord) -> Self {
        Self {
            transaction_id: r.transaction_id,
            reconciled_type: r.reconciled_type,
            reconciled_id: r.reconciled_id,
            reconciled_by: r.reconciled_by,
            reconciled_utc: r.reconciled_utc,
            difference: r.difference.map(Into::into),
            journal_entry_ref: r.journal_entry_ref,
        }
    }
}

// ============================================================================
// Reversal pairing
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReversalDetectionResponse {
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_pattern: Option<String>,
    pub suggested_originals: Vec<SuggestionDto>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PairReversalRequest {
    pub reversal_transaction_id: Uuid,
    pub original_transaction_id: Uuid,
    pub original_was_posted_to_ledger: bool,
    #[validate(length(min = 1, max = 128))]
    pub paired_by: String,
}

#[derive(Debug, Serialize)]
pub struct ReversalPairResponse {
    pub reversal_transaction_id: Uuid,
    pub original_transaction_id: Uuid,
    pub original_was_posted_to_ledger: bool,
    pub paired_by: String,
    pub paired_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_entry_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<PairOutcome> for ReversalPairResponse {
    fn from(outcome: PairOutcome) -> Self {
        Self {
            reversal_transaction_id: outcome.pair.reversal_transaction_id,
            original_transaction_id: outcome.pair.original_transaction_id,
            original_was_posted_to_ledger: outcome.pair.original_was_posted_to_ledger,
            paired_by: outcome.pair.paired_by,
            paired_utc: outcome.pair.paired_utc,
            journal_entry_ref: outcome.pair.journal_entry_ref,
            warning: outcome.warning,
        }
    }
}

// ============================================================================
// Allocations
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AllocateRequest {
    pub payment_id: Uuid,
    pub payment_amount: Decimal,
    pub bill_id: Uuid,
    pub bill_total: Decimal,
    pub amount: Decimal,
    pub allocation_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct BillSettlementDto {
    pub bill_id: Uuid,
    pub allocated: Decimal,
    pub total: Decimal,
    pub status: &'static str,
}

impl From<BillSettlement> for BillSettlementDto {
    fn from(s: BillSettlement) -> Self {
        Self {
            bill_id: s.bill_id,
            allocated: s.allocated,
            total: s.total,
            status: s.status.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AllocationDto {
    pub allocation_id: Uuid,
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub allocation_date: NaiveDate,
}

impl From<Allocation> for AllocationDto {
    fn from(a: Allocation) -> Self {
        Self {
            allocation_id: a.allocation_id,
            bill_id: a.bill_id,
            amount: a.amount,
            allocation_date: a.allocation_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub allocation: AllocationDto,
    pub bill: BillSettlementDto,
}

#[derive(Debug, Serialize)]
pub struct PaymentAllocationsResponse {
    pub payment_id: Uuid,
    pub total_allocated: Decimal,
    pub allocations: Vec<AllocationDto>,
}
