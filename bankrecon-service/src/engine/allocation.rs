//! Allocation tracker: splits of a payment across bills, with conservation
//! on both sides and a derived settlement status per bill.

use crate::models::{Allocation, BillSettlement, BillStatus};
use crate::services::metrics::record_allocation;
use crate::services::store::AllocationStore;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

pub struct AllocationTracker {
    store: Arc<dyn AllocationStore>,
}

impl AllocationTracker {
    pub fn new(store: Arc<dyn AllocationStore>) -> Self {
        Self { store }
    }

    /// Applies a slice of a payment to a bill. The store guards conservation
    /// atomically: the per-payment sum never exceeds the payment amount and
    /// the per-bill sum never exceeds the bill total.
    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id, bill_id = %bill_id))]
    pub async fn allocate(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        payment_amount: Decimal,
        bill_id: Uuid,
        bill_total: Decimal,
        amount: Decimal,
        allocation_date: NaiveDate,
    ) -> Result<(Allocation, BillSettlement), AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Allocation amount must be positive"
            )));
        }
        if payment_amount <= Decimal::ZERO || bill_total <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount and bill total must be positive"
            )));
        }

        let allocation = Allocation {
            allocation_id: Uuid::new_v4(),
            company_id,
            payment_id,
            bill_id,
            amount,
            allocation_date,
            created_utc: Utc::now(),
        };

        let allocation = match self
            .store
            .insert_allocation_checked(allocation, payment_amount, bill_total)
            .await
        {
            Ok(allocation) => allocation,
            Err(e) => {
                record_allocation("allocate", "rejected");
                return Err(e);
            }
        };

        let allocated = self.store.allocated_for_bill(company_id, bill_id).await?;
        record_allocation("allocate", "ok");

        Ok((
            allocation,
            BillSettlement {
                bill_id,
                allocated,
                total: bill_total,
                status: derive_bill_status(allocated, bill_total),
            },
        ))
    }

    /// Removes every allocation for a payment. Idempotent.
    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    pub async fn unallocate_all(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<u64, AppError> {
        let removed = self.store.delete_for_payment(company_id, payment_id).await?;
        record_allocation("unallocate_all", "ok");
        Ok(removed)
    }

    /// Allocations for a payment plus the total already applied.
    pub async fn payment_allocations(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<(Vec<Allocation>, Decimal), AppError> {
        let allocations = self
            .store
            .allocations_for_payment(company_id, payment_id)
            .await?;
        let total: Decimal = allocations.iter().map(|a| a.amount).sum();
        Ok((allocations, total))
    }
}

/// Bill status from allocated-vs-total: `paid` once fully covered,
/// `partially_paid` for anything in between, `unpaid` when untouched.
pub fn derive_bill_status(allocated: Decimal, total: Decimal) -> BillStatus {
    if allocated >= total {
        BillStatus::Paid
    } else if allocated > Decimal::ZERO {
        BillStatus::PartiallyPaid
    } else {
        BillStatus::Unpaid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_status_thresholds() {
        let total = Decimal::from(1_000);
        assert_eq!(derive_bill_status(Decimal::ZERO, total), BillStatus::Unpaid);
        assert_eq!(
            derive_bill_status(Decimal::from(1), total),
            BillStatus::PartiallyPaid
        );
        assert_eq!(
            derive_bill_status(Decimal::from(999), total),
            BillStatus::PartiallyPaid
        );
        assert_eq!(derive_bill_status(total, total), BillStatus::Paid);
    }
}
