//! PostgreSQL reconciliation store.
//!
//! Contended transitions use status-guarded UPDATEs inside a transaction so
//! concurrent callers resolve to exactly one winner.

use crate::models::{Allocation, BankTransaction, ReconciliationRecord, ReversalPair};
use crate::services::metrics::STORE_OP_DURATION;
use crate::services::store::{AllocationStore, ReconciliationStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "transaction_id, company_id, bank_account_id, transaction_date, description, reference, cheque_number, direction, amount, status, created_utc";

#[derive(Debug, Clone, FromRow)]
struct ReconciliationRecordRow {
    transaction_id: Uuid,
    company_id: Uuid,
    reconciled_type: String,
    reconciled_id: String,
    reconciled_by: String,
    reconciled_utc: DateTime<Utc>,
    difference_amount: Option<Decimal>,
    difference_type: Option<String>,
    difference_notes: Option<String>,
    tds_section: Option<String>,
    journal_entry_ref: Option<String>,
}

impl From<ReconciliationRecordRow> for ReconciliationRecord {
    fn from(row: ReconciliationRecordRow) -> Self {
        let difference = match (row.difference_type, row.difference_amount) {
            (Some(difference_type), Some(difference_amount)) => {
                Some(crate::models::DifferenceClassification {
                    difference_amount,
                    difference_type,
                    notes: row.difference_notes,
                    tds_section: row.tds_section,
                })
            }
            _ => None,
        };
        Self {
            transaction_id: row.transaction_id,
            company_id: row.company_id,
            reconciled_type: row.reconciled_type,
            reconciled_id: row.reconciled_id,
            reconciled_by: row.reconciled_by,
            reconciled_utc: row.reconciled_utc,
            difference,
            journal_entry_ref: row.journal_entry_ref,
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "bankrecon-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn transaction_status(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT status FROM bank_transactions
            WHERE company_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read status: {}", e)))?;
        Ok(row.map(|(status,)| status))
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.transaction_id))]
    async fn insert_transaction(
        &self,
        transaction: BankTransaction,
    ) -> Result<BankTransaction, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();

        let inserted = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            INSERT INTO bank_transactions ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {columns}
            "#,
            columns = TRANSACTION_COLUMNS
        ))
        .bind(transaction.transaction_id)
        .bind(transaction.company_id)
        .bind(transaction.bank_account_id)
        .bind(transaction.transaction_date)
        .bind(&transaction.description)
        .bind(&transaction.reference)
        .bind(&transaction.cheque_number)
        .bind(&transaction.direction)
        .bind(transaction.amount)
        .bind(&transaction.status)
        .bind(transaction.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
                anyhow::anyhow!("Transaction {} already exists", transaction.transaction_id),
            ),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert transaction: {}", e)),
        })?;

        timer.observe_duration();
        info!(transaction_id = %inserted.transaction_id, "Bank transaction ingested");

        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %transaction_id))]
    async fn get_transaction(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            SELECT {columns}
            FROM bank_transactions
            WHERE company_id = $1 AND transaction_id = $2
            "#,
            columns = TRANSACTION_COLUMNS
        ))
        .bind(company_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get transaction: {}", e)))?;

        timer.observe_duration();
        Ok(transaction)
    }

    #[instrument(skip(self, record), fields(transaction_id = %record.transaction_id))]
    async fn begin_commit(
        &self,
        record: ReconciliationRecord,
    ) -> Result<ReconciliationRecord, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["begin_commit"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET status = 'reconciled'
            WHERE company_id = $1 AND transaction_id = $2 AND status = 'unreconciled'
            "#,
        )
        .bind(record.company_id)
        .bind(record.transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to reserve commit: {}", e)))?;

        if updated.rows_affected() == 0 {
            let status = self
                .transaction_status(&mut tx, record.company_id, record.transaction_id)
                .await?;
            return match status {
                Some(status) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction {} is already {}",
                    record.transaction_id,
                    status
                ))),
                None => Err(AppError::NotFound(anyhow::anyhow!(
                    "Transaction {} not found",
                    record.transaction_id
                ))),
            };
        }

        let (difference_amount, difference_type, difference_notes, tds_section) =
            match &record.difference {
                Some(d) => (
                    Some(d.difference_amount),
                    Some(d.difference_type.clone()),
                    d.notes.clone(),
                    d.tds_section.clone(),
                ),
                None => (None, None, None, None),
            };

        sqlx::query(
            r#"
            INSERT INTO reconciliation_records (transaction_id, company_id, reconciled_type, reconciled_id, reconciled_by, reconciled_utc, difference_amount, difference_type, difference_notes, tds_section, journal_entry_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.transaction_id)
        .bind(record.company_id)
        .bind(&record.reconciled_type)
        .bind(&record.reconciled_id)
        .bind(&record.reconciled_by)
        .bind(record.reconciled_utc)
        .bind(difference_amount)
        .bind(difference_type)
        .bind(difference_notes)
        .bind(tds_section)
        .bind(&record.journal_entry_ref)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert record: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(record)
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %transaction_id))]
    async fn set_journal_entry_ref(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
        journal_entry_ref: &str,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE reconciliation_records
            SET journal_entry_ref = $3
            WHERE company_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .bind(journal_entry_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set journal ref: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "No reconciliation record for transaction {}",
                transaction_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %transaction_id))]
    async fn unreconcile(&self, company_id: Uuid, transaction_id: Uuid) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["unreconcile"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT status FROM bank_transactions
            WHERE company_id = $1 AND transaction_id = $2
            FOR UPDATE
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock transaction: {}", e)))?;

        let status = row
            .map(|(status,)| status)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Transaction {} not found", transaction_id))
            })?;

        if status == "cancelled" {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} is cancelled by a reversal pair",
                transaction_id
            )));
        }

        sqlx::query(
            r#"
            DELETE FROM reconciliation_records
            WHERE company_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete record: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET status = 'unreconciled'
            WHERE company_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to reset status: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %transaction_id))]
    async fn get_record(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReconciliationRecord>, AppError> {
        let row = sqlx::query_as::<_, ReconciliationRecordRow>(
            r#"
            SELECT transaction_id, company_id, reconciled_type, reconciled_id, reconciled_by, reconciled_utc, difference_amount, difference_type, difference_notes, tds_section, journal_entry_ref
            FROM reconciliation_records
            WHERE company_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get record: {}", e)))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(company_id = %company_id, bank_account_id = %bank_account_id))]
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

        let originals = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            SELECT {columns}
            FROM bank_transactions t
            WHERE t.company_id = $1 AND t.bank_account_id = $2
              AND t.direction = 'debit' AND t.status <> 'cancelled'
              AND t.transaction_date BETWEEN $3 AND $4
              AND NOT EXISTS (
                  SELECT 1 FROM reversal_pairs p
                  WHERE p.reversal_transaction_id = t.transaction_id
                     OR p.original_transaction_id = t.transaction_id
              )
            ORDER BY t.transaction_date DESC
            "#,
            columns = TRANSACTION_COLUMNS
        ))
        .bind(company_id)
        .bind(bank_account_id)
        .bind(window_start)
        .bind(reference_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list reversal originals: {}", e))
        })?;

        timer.observe_duration();
        Ok(originals)
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %transaction_id))]
    async fn get_pair_for(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalPair>, AppError> {
        let pair = sqlx::query_as::<_, ReversalPair>(
            r#"
            SELECT reversal_transaction_id, original_transaction_id, company_id, original_was_posted_to_ledger, paired_by, paired_utc, journal_entry_ref
            FROM reversal_pairs
            WHERE company_id = $1 AND (reversal_transaction_id = $2 OR original_transaction_id = $2)
            "#,
        )
        .bind(company_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get pair: {}", e)))?;

        Ok(pair)
    }

    #[instrument(skip(self, pair), fields(reversal_transaction_id = %pair.reversal_transaction_id))]
    async fn create_pair(&self, pair: ReversalPair) -> Result<ReversalPair, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["create_pair"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT reversal_transaction_id FROM reversal_pairs
            WHERE company_id = $1
              AND (reversal_transaction_id IN ($2, $3) OR original_transaction_id IN ($2, $3))
            LIMIT 1
            "#,
        )
        .bind(pair.company_id)
        .bind(pair.reversal_transaction_id)
        .bind(pair.original_transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check pairs: {}", e)))?;

        if existing.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction already participates in a reversal pair"
            )));
        }

        let reversal_updated = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET status = 'cancelled'
            WHERE company_id = $1 AND transaction_id = $2 AND status = 'unreconciled'
            "#,
        )
        .bind(pair.company_id)
        .bind(pair.reversal_transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel reversal: {}", e)))?;

        if reversal_updated.rows_affected() == 0 {
            let status = self
                .transaction_status(&mut tx, pair.company_id, pair.reversal_transaction_id)
                .await?;
            return match status {
                Some(status) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Reversal transaction {} is {}",
                    pair.reversal_transaction_id,
                    status
                ))),
                None => Err(AppError::NotFound(anyhow::anyhow!(
                    "Transaction {} not found",
                    pair.reversal_transaction_id
                ))),
            };
        }

        let original_updated = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET status = 'cancelled'
            WHERE company_id = $1 AND transaction_id = $2 AND status IN ('unreconciled', 'reconciled')
            "#,
        )
        .bind(pair.company_id)
        .bind(pair.original_transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel original: {}", e)))?;

        if original_updated.rows_affected() == 0 {
            let status = self
                .transaction_status(&mut tx, pair.company_id, pair.original_transaction_id)
                .await?;
            return match status {
                Some(status) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Original transaction {} is {}",
                    pair.original_transaction_id,
                    status
                ))),
                None => Err(AppError::NotFound(anyhow::anyhow!(
                    "Transaction {} not found",
                    pair.original_transaction_id
                ))),
            };
        }

        sqlx::query(
            r#"
            INSERT INTO reversal_pairs (reversal_transaction_id, original_transaction_id, company_id, original_was_posted_to_ledger, paired_by, paired_utc, journal_entry_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pair.reversal_transaction_id)
        .bind(pair.original_transaction_id)
        .bind(pair.company_id)
        .bind(pair.original_was_posted_to_ledger)
        .bind(&pair.paired_by)
        .bind(pair.paired_utc)
        .bind(&pair.journal_entry_ref)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
                anyhow::anyhow!("Transaction already participates in a reversal pair"),
            ),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert pair: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            original_transaction_id = %pair.original_transaction_id,
            "Reversal pair created"
        );

        Ok(pair)
    }

    #[instrument(skip(self), fields(company_id = %company_id, reversal_transaction_id = %reversal_transaction_id))]
    async fn set_pair_journal_ref(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
        journal_entry_ref: &str,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE reversal_pairs
            SET journal_entry_ref = $3
            WHERE company_id = $1 AND reversal_transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(reversal_transaction_id)
        .bind(journal_entry_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set pair journal ref: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "No reversal pair for transaction {}",
                reversal_transaction_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, reversal_transaction_id = %reversal_transaction_id))]
    async fn remove_pair(
        &self,
        company_id: Uuid,
        reversal_transaction_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["remove_pair"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let removed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            DELETE FROM reversal_pairs
            WHERE company_id = $1 AND reversal_transaction_id = $2
            RETURNING original_transaction_id
            "#,
        )
        .bind(company_id)
        .bind(reversal_transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete pair: {}", e)))?;

        let (original_transaction_id,) = removed.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "No reversal pair for transaction {}",
                reversal_transaction_id
            ))
        })?;

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET status = 'unreconciled'
            WHERE company_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(reversal_transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to restore reversal: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE bank_transactions t
            SET status = CASE
                WHEN EXISTS (
                    SELECT 1 FROM reconciliation_records r
                    WHERE r.company_id = $1 AND r.transaction_id = $2
                ) THEN 'reconciled'
                ELSE 'unreconciled'
            END
            WHERE t.company_id = $1 AND t.transaction_id = $2
            "#,
        )
        .bind(company_id)
        .bind(original_transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to restore original: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl AllocationStore for PgStore {
    #[instrument(skip(self, allocation), fields(payment_id = %allocation.payment_id, bill_id = %allocation.bill_id))]
    async fn insert_allocation_checked(
        &self,
        allocation: Allocation,
        payment_amount: Decimal,
        bill_total: Decimal,
    ) -> Result<Allocation, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_allocation"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Serialize concurrent allocations touching the same payment or bill.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0)), pg_advisory_xact_lock(hashtextextended($2, 0))")
            .bind(allocation.payment_id.to_string())
            .bind(allocation.bill_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock allocation keys: {}", e)))?;

        let inserted = sqlx::query_as::<_, Allocation>(
            r#"
            INSERT INTO allocations (allocation_id, company_id, payment_id, bill_id, amount, allocation_date, created_utc)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE (SELECT COALESCE(SUM(amount), 0) FROM allocations WHERE company_id = $2 AND payment_id = $3) + $5 <= $8
              AND (SELECT COALESCE(SUM(amount), 0) FROM allocations WHERE company_id = $2 AND bill_id = $4) + $5 <= $9
            RETURNING allocation_id, company_id, payment_id, bill_id, amount, allocation_date, created_utc
            "#,
        )
        .bind(allocation.allocation_id)
        .bind(allocation.company_id)
        .bind(allocation.payment_id)
        .bind(allocation.bill_id)
        .bind(allocation.amount)
        .bind(allocation.allocation_date)
        .bind(allocation.created_utc)
        .bind(payment_amount)
        .bind(bill_total)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert allocation: {}", e)))?;

        let inserted = inserted.ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "Allocation would exceed the payment amount or bill total"
            ))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    async fn allocations_for_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError> {
        let allocations = sqlx::query_as::<_, Allocation>(
            r#"
            SELECT allocation_id, company_id, payment_id, bill_id, amount, allocation_date, created_utc
            FROM allocations
            WHERE company_id = $1 AND payment_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(company_id)
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list allocations: {}", e)))?;

        Ok(allocations)
    }

    #[instrument(skip(self), fields(company_id = %company_id, bill_id = %bill_id))]
    async fn allocated_for_bill(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Decimal, AppError> {
        let (total,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM allocations
            WHERE company_id = $1 AND bill_id = $2
            "#,
        )
        .bind(company_id)
        .bind(bill_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum allocations: {}", e)))?;

        Ok(total)
    }

    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    async fn delete_for_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<u64, AppError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM allocations
            WHERE company_id = $1 AND payment_id = $2
            "#,
        )
        .bind(company_id)
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete allocations: {}", e))
        })?;

        Ok(deleted.rows_affected())
    }
}
