//! Reconciliation state store: the authoritative record of which bank
//! transactions are reconciled, to what, and how reversal pairs and
//! allocations stand.
//!
//! Two implementations: PostgreSQL for deployment, in-memory for tests and
//! standalone operation. Both enforce the same check-and-set guarantees on
//! contended operations so concurrent commits resolve to one winner.

pub mod memory;
pub mod postgres;

use crate::models::{Allocation, BankTransaction, ReconciliationRecord, ReversalPair};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn insert_transaction(
        &self,
        transaction: BankTransaction,
    ) -> Result<BankTransaction, AppError>;

    async fn get_transaction(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError>;

    /// Atomically transitions an unreconciled transaction to reconciled and
    /// stores its record. Exactly one concurrent caller wins; the rest get
    /// Conflict. NotFound when the transaction does not exist.
    async fn begin_commit(
        &self,
        record: ReconciliationRecord,
    ) -> Result<ReconciliationRecord, AppError>;

    /// Attaches the downstream journal entry reference to a live record.
    async fn set_journal_entry_ref(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
        journal_entry_ref: &str,
    ) -> Result<(), AppError>;

    /// Removes the record and returns the transaction to unreconciled.
    /// No-op when already unreconciled; Conflict on a cancelled transaction.
    async fn unreconcile(&self, company_id: Uuid, transaction_id: Uuid) -> Result<(), AppError>;

    async fn get_record(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReconciliationRecord>, AppError>;

    /// Unpaired, non-cancelled debit transactions on the account dated within
    /// `lookback_days` before (and including) `reference_date`.
    async fn list_reversal_originals(
        &self,
        company_id: Uuid,
        bank_account_id: Uuid,
        reference_date: NaiveDate,
        lookback_days: i64,
    ) -> Result<Vec<BankTransaction>, AppError>;

    async fn get_pair_for(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalPair>, AppError>;

    /// Atomically records the pair and cancels both transactions. Conflict
    /// when either side already participates in a pair.
    async fn create_pair(&self, pair: ReversalPair) -> Result<ReversalPair, AppError>;

    async fn set_pair_journal_ref(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
        journal_entry_ref: &str,
    ) -> Result<(), AppError>;

    /// Unwinds a pair: deletes it and restores both transaction statuses
    /// (reconciled when a live record exists, unreconciled otherwise).
    async fn remove_pair(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
    ) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Inserts an allocation only if conservation holds for both sides:
    /// per-payment sum stays within `payment_amount` and per-bill sum within
    /// `bill_total`. Conflict otherwise; the check and insert are atomic.
    async fn insert_allocation_checked(
        &self,
        allocation: Allocation,
        payment_amount: Decimal,
        bill_total: Decimal,
    ) -> Result<Allocation, AppError>;

    async fn allocations_for_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError>;

    async fn allocated_for_bill(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Decimal, AppError>;

    /// Removes every allocation for the payment. Idempotent.
    async fn delete_for_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<u64, AppError>;
}
