//! In-memory reconciliation store.
//!
//! Backs tests and standalone operation. A single RwLock over the state makes
//! every contended operation an atomic check-and-set, matching the guarded
//! SQL of the PostgreSQL store.

use crate::models::{Allocation, BankTransaction, ReconStatus, ReconciliationRecord, ReversalPair};
use crate::services::metrics::STORE_OP_DURATION;
use crate::services::store::{AllocationStore, ReconciliationStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    transactions: HashMap<Uuid, BankTransaction>,
    records: HashMap<Uuid, ReconciliationRecord>,
    /// Keyed by reversal transaction id.
    pairs: HashMap<Uuid, ReversalPair>,
    /// Either side of a pair -> reversal transaction id.
    pair_index: HashMap<Uuid, Uuid>,
    allocations: Vec<Allocation>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(transaction_id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Transaction {} not found", transaction_id))
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn insert_transaction(
        &self,
        transaction: BankTransaction,
    ) -> Result<BankTransaction, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();

        let mut inner = self.inner.write().await;
        if inner.transactions.contains_key(&transaction.transaction_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} already exists",
                transaction.transaction_id
            )));
        }
        inner
            .transactions
            .insert(transaction.transaction_id, transaction.clone());

        timer.observe_duration();
        Ok(transaction)
    }

    async fn get_transaction(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .get(&transaction_id)
            .filter(|t| t.company_id == company_id)
            .cloned())
    }

    async fn begin_commit(
        &self,
        record: ReconciliationRecord,
    ) -> Result<ReconciliationRecord, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["begin_commit"])
            .start_timer();

        let mut inner = self.inner.write().await;
        let transaction = inner
            .transactions
            .get_mut(&record.transaction_id)
            .filter(|t| t.company_id == record.company_id)
            .ok_or_else(|| not_found(record.transaction_id))?;

        if ReconStatus::from_str(&transaction.status) != ReconStatus::Unreconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} is already {}",
                record.transaction_id,
                transaction.status
            )));
        }

        transaction.status = ReconStatus::Reconciled.as_str().to_string();
        inner.records.insert(record.transaction_id, record.clone());

        timer.observe_duration();
        Ok(record)
    }

    async fn set_journal_entry_ref(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
        journal_entry_ref: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&transaction_id)
            .filter(|r| r.company_id == company_id)
            .ok_or_else(|| not_found(transaction_id))?;
        record.journal_entry_ref = Some(journal_entry_ref.to_string());
        Ok(())
    }

    async fn unreconcile(&self, company_id: Uuid, transaction_id: Uuid) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["unreconcile"])
            .start_timer();

        let mut inner = self.inner.write().await;
        let transaction = inner
            .transactions
            .get_mut(&transaction_id)
            .filter(|t| t.company_id == company_id)
            .ok_or_else(|| not_found(transaction_id))?;

        match ReconStatus::from_str(&transaction.status) {
            ReconStatus::Cancelled => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction {} is cancelled by a reversal pair",
                    transaction_id
                )));
            }
            ReconStatus::Reconciled => {
                transaction.status = ReconStatus::Unreconciled.as_str().to_string();
                inner.records.remove(&transaction_id);
            }
            ReconStatus::Unreconciled => {
                inner.records.remove(&transaction_id);
            }
        }

        timer.observe_duration();
        Ok(())
    }

    async fn get_record(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReconciliationRecord>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&transaction_id)
            .filter(|r| r.company_id == company_id)
            .cloned())
    }

    async fn list_reversal_originals(
        &self,
        company_id: Uuid,
        bank_account_id: Uuid,
        reference_date: NaiveDate,
        lookback_days: i64,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_reversal_originals"])
            .start_timer();

        let window_start = reference_date - chrono::Duration::days(lookback_days);
        let inner = self.inner.read().await;
        let mut originals: Vec<BankTransaction> = inner
            .transactions
            .values()
            .filter(|t| {
                t.company_id == company_id
                    && t.bank_account_id == bank_account_id
                    && t.direction == "debit"
                    && t.status != "cancelled"
                    && t.transaction_date >= window_start
                    && t.transaction_date <= reference_date
                    && !inner.pair_index.contains_key(&t.transaction_id)
            })
            .cloned()
            .collect();
        originals.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));

        timer.observe_duration();
        Ok(originals)
    }

    async fn get_pair_for(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalPair>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .pair_index
            .get(&transaction_id)
            .and_then(|reversal_id| inner.pairs.get(reversal_id))
            .filter(|p| p.company_id == company_id)
            .cloned())
    }

    async fn create_pair(&self, pair: ReversalPair) -> Result<ReversalPair, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["create_pair"])
            .start_timer();

        let mut inner = self.inner.write().await;

        if inner.pair_index.contains_key(&pair.reversal_transaction_id)
            || inner.pair_index.contains_key(&pair.original_transaction_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction already participates in a reversal pair"
            )));
        }

        let reversal_status = inner
            .transactions
            .get(&pair.reversal_transaction_id)
            .filter(|t| t.company_id == pair.company_id)
            .map(|t| t.status.clone())
            .ok_or_else(|| not_found(pair.reversal_transaction_id))?;
        if ReconStatus::from_str(&reversal_status) != ReconStatus::Unreconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Reversal transaction {} is {}",
                pair.reversal_transaction_id,
                reversal_status
            )));
        }

        let original_status = inner
            .transactions
            .get(&pair.original_transaction_id)
            .filter(|t| t.company_id == pair.company_id)
            .map(|t| t.status.clone())
            .ok_or_else(|| not_found(pair.original_transaction_id))?;
        if ReconStatus::from_str(&original_status) == ReconStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Original transaction {} is already cancelled",
                pair.original_transaction_id
            )));
        }

        for id in [pair.reversal_transaction_id, pair.original_transaction_id] {
            if let Some(t) = inner.transactions.get_mut(&id) {
                t.status = ReconStatus::Cancelled.as_str().to_string();
            }
        }
        inner
            .pair_index
            .insert(pair.reversal_transaction_id, pair.reversal_transaction_id);
        inner
            .pair_index
            .insert(pair.original_transaction_id, pair.reversal_transaction_id);
        inner.pairs.insert(pair.reversal_transaction_id, pair.clone());

        timer.observe_duration();
        Ok(pair)
    }

    async fn set_pair_journal_ref(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
        journal_entry_ref: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let pair = inner
            .pairs
            .get_mut(&reversal_transaction_id)
            .filter(|p| p.company_id == company_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "No reversal pair for transaction {}",
                    reversal_transaction_id
                ))
            })?;
        pair.journal_entry_ref = Some(journal_entry_ref.to_string());
        Ok(())
    }

    async fn remove_pair(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["remove_pair"])
            .start_timer();

        let mut inner = self.inner.write().await;
        let belongs_to_company = inner
            .pairs
            .get(&reversal_transaction_id)
            .is_some_and(|p| p.company_id == company_id);
        if !belongs_to_company {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "No reversal pair for transaction {}",
                reversal_transaction_id
            )));
        }
        let pair = inner
            .pairs
            .remove(&reversal_transaction_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "No reversal pair for transaction {}",
                    reversal_transaction_id
                ))
            })?;

        inner.pair_index.remove(&pair.reversal_transaction_id);
        inner.pair_index.remove(&pair.original_transaction_id);

        if let Some(t) = inner.transactions.get_mut(&pair.reversal_transaction_id) {
            t.status = ReconStatus::Unreconciled.as_str().to_string();
        }
        let original_reconciled = inner.records.contains_key(&pair.original_transaction_id);
        if let Some(t) = inner.transactions.get_mut(&pair.original_transaction_id) {
            t.status = if original_reconciled {
                ReconStatus::Reconciled.as_str().to_string()
            } else {
                ReconStatus::Unreconciled.as_str().to_string()
            };
        }

        timer.observe_duration();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl AllocationStore for MemoryStore {
    async fn insert_allocation_checked(
        &self,
        allocation: Allocation,
        payment_amount: Decimal,
        bill_total: Decimal,
    ) -> Result<Allocation, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_allocation"])
            .start_timer();

        let mut inner = self.inner.write().await;

        let payment_allocated: Decimal = inner
            .allocations
            .iter()
            .filter(|a| {
                a.company_id == allocation.company_id && a.payment_id == allocation.payment_id
            })
            .map(|a| a.amount)
            .sum();
        if payment_allocated + allocation.amount > payment_amount {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Allocation exceeds payment amount: {} already allocated of {}",
                payment_allocated,
                payment_amount
            )));
        }

        let bill_allocated: Decimal = inner
            .allocations
            .iter()
            .filter(|a| a.company_id == allocation.company_id && a.bill_id == allocation.bill_id)
            .map(|a| a.amount)
            .sum();
        if bill_allocated + allocation.amount > bill_total {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Allocation exceeds bill total: {} already allocated of {}",
                bill_allocated,
                bill_total
            )));
        }

        inner.allocations.push(allocation.clone());

        timer.observe_duration();
        Ok(allocation)
    }

    async fn allocations_for_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .allocations
            .iter()
            .filter(|a| a.company_id == company_id && a.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn allocated_for_bill(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Decimal, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .allocations
            .iter()
            .filter(|a| a.company_id == company_id && a.bill_id == bill_id)
            .map(|a| a.amount)
            .sum())
    }

    async fn delete_for_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;
        let before = inner.allocations.len();
        inner
            .allocations
            .retain(|a| !(a.company_id == company_id && a.payment_id == payment_id));
        Ok((before - inner.allocations.len()) as u64)
    }
}
