//! Candidate source port: read-only access to pools of reconcilable business
//! records, owned by the books service.

use crate::models::{DateWindow, DebitRecordType, Direction, ReconciliationCandidate};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidate pool for a transaction: credit transactions query incoming
    /// payments, debit transactions query outgoing records of every type.
    async fn list_candidates(
        &self,
        company_id: Uuid,
        direction: Direction,
        window: DateWindow,
    ) -> Result<Vec<ReconciliationCandidate>, AppError>;

    /// Free-text pool, optionally restricted to an amount range.
    async fn search_candidates(
        &self,
        company_id: Uuid,
        text: &str,
        amount_range: Option<(Decimal, Decimal)>,
    ) -> Result<Vec<ReconciliationCandidate>, AppError>;
}

// ============================================================================
// HTTP implementation against the books service
// ============================================================================

#[derive(Debug, Deserialize)]
struct PaymentDto {
    payment_id: Uuid,
    party_name: String,
    invoice_ref: Option<String>,
    amount: Decimal,
    payment_date: NaiveDate,
}

impl From<PaymentDto> for ReconciliationCandidate {
    fn from(p: PaymentDto) -> Self {
        Self::Payment {
            payment_id: p.payment_id,
            party_name: p.party_name,
            invoice_ref: p.invoice_ref,
            amount: p.amount,
            payment_date: p.payment_date,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DebitRecordDto {
    record_id: Uuid,
    record_type: String,
    payee_name: String,
    amount: Decimal,
    record_date: NaiveDate,
    tds_amount: Option<Decimal>,
    tds_section: Option<String>,
}

impl From<DebitRecordDto> for ReconciliationCandidate {
    fn from(r: DebitRecordDto) -> Self {
        // Unknown record types from the books service collapse to `other`.
        let record_type = DebitRecordType::from_str(&r.record_type).as_str().to_string();
        Self::DebitRecord {
            record_id: r.record_id,
            record_type,
            payee_name: r.payee_name,
            amount: r.amount,
            record_date: r.record_date,
            tds_amount: r.tds_amount,
            tds_section: r.tds_section,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResultsDto {
    #[serde(default)]
    payments: Vec<PaymentDto>,
    #[serde(default)]
    debit_records: Vec<DebitRecordDto>,
}

pub struct HttpCandidateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCandidateSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let response = self
            .client
            .traced_get(url)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("books service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "books service returned {} for {}",
                response.status(),
                url
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::BadGateway(format!("books service response malformed: {}", e)))
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_candidates(
        &self,
        company_id: Uuid,
        direction: Direction,
        window: DateWindow,
    ) -> Result<Vec<ReconciliationCandidate>, AppError> {
        match direction {
            Direction::Credit => {
                let url = format!(
                    "{}/companies/{}/payments?from={}&to={}",
                    self.base_url, company_id, window.start, window.end
                );
                let payments: Vec<PaymentDto> = self.fetch_json(&url).await?;
                Ok(payments.into_iter().map(Into::into).collect())
            }
            Direction::Debit => {
                let url = format!(
                    "{}/companies/{}/debit-records?from={}&to={}",
                    self.base_url, company_id, window.start, window.end
                );
                let records: Vec<DebitRecordDto> = self.fetch_json(&url).await?;
                Ok(records.into_iter().map(Into::into).collect())
            }
        }
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn search_candidates(
        &self,
        company_id: Uuid,
        text: &str,
        amount_range: Option<(Decimal, Decimal)>,
    ) -> Result<Vec<ReconciliationCandidate>, AppError> {
        let mut url = format!(
            "{}/companies/{}/records/search?q={}",
            self.base_url,
            company_id,
            urlencode(text)
        );
        if let Some((min, max)) = amount_range {
            url.push_str(&format!("&min_amount={}&max_amount={}", min, max));
        }

        let results: SearchResultsDto = self.fetch_json(&url).await?;
        let mut candidates: Vec<ReconciliationCandidate> =
            results.payments.into_iter().map(Into::into).collect();
        candidates.extend(results.debit_records.into_iter().map(Into::into));
        Ok(candidates)
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                c.to_string()
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}

// ============================================================================
// Static implementation for tests and standalone operation
// ============================================================================

/// In-memory candidate pool. Applies the same date-window and amount-range
/// filtering a real source would.
#[derive(Default)]
pub struct StaticCandidateSource {
    payments: RwLock<Vec<ReconciliationCandidate>>,
    debit_records: RwLock<Vec<ReconciliationCandidate>>,
}

impl StaticCandidateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_payment(
        &self,
        payment_id: Uuid,
        party_name: &str,
        invoice_ref: Option<&str>,
        amount: Decimal,
        payment_date: NaiveDate,
    ) {
        self.payments
            .write()
            .await
            .push(ReconciliationCandidate::Payment {
                payment_id,
                party_name: party_name.to_string(),
                invoice_ref: invoice_ref.map(|s| s.to_string()),
                amount,
                payment_date,
            });
    }

    pub async fn add_debit_record(
        &self,
        record_id: Uuid,
        record_type: &str,
        payee_name: &str,
        amount: Decimal,
        record_date: NaiveDate,
        tds_amount: Option<Decimal>,
        tds_section: Option<&str>,
    ) {
        self.debit_records
            .write()
            .await
            .push(ReconciliationCandidate::DebitRecord {
                record_id,
                record_type: DebitRecordType::from_str(record_type).as_str().to_string(),
                payee_name: payee_name.to_string(),
                amount,
                record_date,
                tds_amount,
                tds_section: tds_section.map(|s| s.to_string()),
            });
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn list_candidates(
        &self,
        _company_id: Uuid,
        direction: Direction,
        window: DateWindow,
    ) -> Result<Vec<ReconciliationCandidate>, AppError> {
        let pool = match direction {
            Direction::Credit => self.payments.read().await,
            Direction::Debit => self.debit_records.read().await,
        };
        Ok(pool
            .iter()
            .filter(|c| window.contains(c.record_date()))
            .cloned()
            .collect())
    }

    async fn search_candidates(
        &self,
        _company_id: Uuid,
        _text: &str,
        amount_range: Option<(Decimal, Decimal)>,
    ) -> Result<Vec<ReconciliationCandidate>, AppError> {
        let payments = self.payments.read().await;
        let debit_records = self.debit_records.read().await;
        let in_range = |c: &ReconciliationCandidate| match amount_range {
            Some((min, max)) => c.amount() >= min && c.amount() <= max,
            None => true,
        };
        Ok(payments
            .iter()
            .chain(debit_records.iter())
            .filter(|c| in_range(c))
            .cloned()
            .collect())
    }
}
