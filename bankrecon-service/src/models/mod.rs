//! Domain models for bankrecon-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    /// Strict parse for request validation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            _ => None,
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Debit)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconStatus {
    Unreconciled,
    Reconciled,
    Cancelled,
}

impl ReconStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreconciled => "unreconciled",
            Self::Reconciled => "reconciled",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "unreconciled" => Self::Unreconciled,
            "reconciled" => Self::Reconciled,
            "cancelled" => Self::Cancelled,
            _ => Self::Unreconciled,
        }
    }
}

/// One bank statement line. Amount is always positive; direction tells the
/// side. Status is only ever mutated by the reconciliation ledger and the
/// reversal pairing flow.
#[derive(Debug, Clone, FromRow)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub company_id: Uuid,
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

impl BankTransaction {
    pub fn direction(&self) -> Direction {
        Direction::from_str(&self.direction)
    }

    pub fn status(&self) -> ReconStatus {
        ReconStatus::from_str(&self.status)
    }

    pub fn is_unreconciled(&self) -> bool {
        self.status() == ReconStatus::Unreconciled
    }
}

// ============================================================================
// Candidate Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitRecordType {
    Salary,
    Contractor,
    VendorPayment,
    ExpenseClaim,
    Subscription,
    LoanPayment,
    AssetMaintenance,
    TaxPayment,
    Transfer,
    Other,
}

impl DebitRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::Contractor => "contractor",
            Self::VendorPayment => "vendor_payment",
            Self::ExpenseClaim => "expense_claim",
            Self::Subscription => "subscription",
            Self::LoanPayment => "loan_payment",
            Self::AssetMaintenance => "asset_maintenance",
            Self::TaxPayment => "tax_payment",
            Self::Transfer => "transfer",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "salary" => Self::Salary,
            "contractor" => Self::Contractor,
            "vendor_payment" => Self::VendorPayment,
            "expense_claim" => Self::ExpenseClaim,
            "subscription" => Self::Subscription,
            "loan_payment" => Self::LoanPayment,
            "asset_maintenance" => Self::AssetMaintenance,
            "tax_payment" => Self::TaxPayment,
            "transfer" => Self::Transfer,
            _ => Self::Other,
        }
    }
}

/// A record eligible to match a bank transaction. Generated per query from
/// the candidate source, never persisted here.
#[derive(Debug, Clone)]
pub enum ReconciliationCandidate {
    Payment {
        payment_id: Uuid,
        party_name: String,
        invoice_ref: Option<String>,
        amount: Decimal,
        payment_date: NaiveDate,
    },
    DebitRecord {
        record_id: Uuid,
        record_type: String,
        payee_name: String,
        amount: Decimal,
        record_date: NaiveDate,
        tds_amount: Option<Decimal>,
        tds_section: Option<String>,
    },
    ReversalOriginal {
        transaction_id: Uuid,
        amount: Decimal,
        transaction_date: NaiveDate,
        description: String,
        is_reconciled: bool,
        reconciled_type: Option<String>,
    },
}

impl ReconciliationCandidate {
    pub fn source_type(&self) -> &'static str {
        match self {
            Self::Payment { .. } => "payment",
            Self::DebitRecord { .. } => "debit_record",
            Self::ReversalOriginal { .. } => "reversal_original",
        }
    }

    pub fn record_id(&self) -> Uuid {
        match self {
            Self::Payment { payment_id, .. } => *payment_id,
            Self::DebitRecord { record_id, .. } => *record_id,
            Self::ReversalOriginal { transaction_id, .. } => *transaction_id,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Self::Payment { amount, .. }
            | Self::DebitRecord { amount, .. }
            | Self::ReversalOriginal { amount, .. } => *amount,
        }
    }

    pub fn record_date(&self) -> NaiveDate {
        match self {
            Self::Payment { payment_date, .. } => *payment_date,
            Self::DebitRecord { record_date, .. } => *record_date,
            Self::ReversalOriginal {
                transaction_date, ..
            } => *transaction_date,
        }
    }

    pub fn counterparty(&self) -> &str {
        match self {
            Self::Payment { party_name, .. } => party_name,
            Self::DebitRecord { payee_name, .. } => payee_name,
            Self::ReversalOriginal { description, .. } => description,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Payment { invoice_ref, .. } => invoice_ref.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// Difference Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceType {
    BankInterest,
    BankCharges,
    TdsDeducted,
    RoundOff,
    ForexGain,
    ForexLoss,
    OtherIncome,
    OtherExpense,
    Suspense,
}

impl DifferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankInterest => "bank_interest",
            Self::BankCharges => "bank_charges",
            Self::TdsDeducted => "tds_deducted",
            Self::RoundOff => "round_off",
            Self::ForexGain => "forex_gain",
            Self::ForexLoss => "forex_loss",
            Self::OtherIncome => "other_income",
            Self::OtherExpense => "other_expense",
            Self::Suspense => "suspense",
        }
    }

    /// The taxonomy is closed: anything outside the nine kinds is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank_interest" => Some(Self::BankInterest),
            "bank_charges" => Some(Self::BankCharges),
            "tds_deducted" => Some(Self::TdsDeducted),
            "round_off" => Some(Self::RoundOff),
            "forex_gain" => Some(Self::ForexGain),
            "forex_loss" => Some(Self::ForexLoss),
            "other_income" => Some(Self::OtherIncome),
            "other_expense" => Some(Self::OtherExpense),
            "suspense" => Some(Self::Suspense),
            _ => None,
        }
    }
}

/// Confirmed classification of an amount gap, attached to a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceClassification {
    /// Signed: bank amount minus candidate amount.
    pub difference_amount: Decimal,
    pub difference_type: String,
    pub notes: Option<String>,
    pub tds_section: Option<String>,
}

/// Heuristic default surfaced for operator confirmation, never auto-applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferencePreset {
    pub difference_amount: Decimal,
    pub suggested_type: DifferenceType,
}

// ============================================================================
// Reconciliation Models
// ============================================================================

/// The committed outcome for one bank transaction. Exactly one live record
/// per transaction; replaced only via unreconcile + fresh commit.
#[derive(Debug, Clone)]
pub struct ReconciliationRecord {
    pub transaction_id: Uuid,
    pub company_id: Uuid,
    pub reconciled_type: String,
    pub reconciled_id: String,
    pub reconciled_by: String,
    pub reconciled_utc: DateTime<Utc>,
    pub difference: Option<DifferenceClassification>,
    pub journal_entry_ref: Option<String>,
}

// ============================================================================
// Reversal Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ReversalPair {
    pub reversal_transaction_id: Uuid,
    pub original_transaction_id: Uuid,
    pub company_id: Uuid,
    pub original_was_posted_to_ledger: bool,
    pub paired_by: String,
    pub paired_utc: DateTime<Utc>,
    pub journal_entry_ref: Option<String>,
}

/// Result of the reversal narration/candidate scan for one credit transaction.
#[derive(Debug, Clone)]
pub struct ReversalDetection {
    pub detected_pattern: Option<String>,
    pub suggested_originals: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub pair: ReversalPair,
    pub warning: Option<String>,
}

// ============================================================================
// Suggestion Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBand {
    High,
    Medium,
    Low,
}

impl MatchBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_score(score: i32) -> Self {
        if score >= 80 {
            Self::High
        } else if score >= 50 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: ReconciliationCandidate,
    pub score: i32,
    pub amount_difference: Decimal,
    pub date_distance_days: i64,
    pub match_reason: String,
}

impl ScoredCandidate {
    pub fn band(&self) -> MatchBand {
        MatchBand::from_score(self.score)
    }
}

/// Inclusive date window for candidate pool queries.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn around(date: NaiveDate, days: i64) -> Self {
        Self {
            start: date - chrono::Duration::days(days),
            end: date + chrono::Duration::days(days),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

// ============================================================================
// Allocation Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct Allocation {
    pub allocation_id: Uuid,
    pub company_id: Uuid,
    pub payment_id: Uuid,
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub allocation_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
        }
    }
}

/// Derived settlement position of one bill.
#[derive(Debug, Clone)]
pub struct BillSettlement {
    pub bill_id: Uuid,
    pub allocated: Decimal,
    pub total: Decimal,
    pub status: BillStatus,
}
