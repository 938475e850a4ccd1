//! Common test utilities for bankrecon-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bankrecon_service::config::{
    BankreconConfig, BooksServiceConfig, LedgerServiceConfig, MatchingConfig,
};
use bankrecon_service::models::{DifferenceClassification, ReversalPair};
use bankrecon_service::services::posting::LedgerPoster;
use bankrecon_service::services::{MemoryStore, StaticCandidateSource};
use bankrecon_service::startup::Application;
use service_core::config::Config as CommonConfig;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use tokio::sync::Mutex;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,bankrecon_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Test configuration: random port, in-memory store, no external services.
pub fn test_config() -> BankreconConfig {
    BankreconConfig {
        common: CommonConfig { port: 0 },
        service_name: "bankrecon-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: None,
        books_service: BooksServiceConfig { url: None },
        ledger_service: LedgerServiceConfig {
            url: String::new(),
        },
        matching: MatchingConfig::default(),
    }
}

/// Ledger poster double: records every posting, optionally failing the next
/// call to exercise the all-or-nothing commit path.
#[derive(Default)]
pub struct RecordingPoster {
    pub adjustments: Mutex<Vec<(Uuid, DifferenceClassification)>>,
    pub reversals: Mutex<Vec<ReversalPair>>,
    pub fail_next: AtomicBool,
}

impl RecordingPoster {
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn adjustment_count(&self) -> usize {
        self.adjustments.lock().await.len()
    }

    pub async fn reversal_count(&self) -> usize {
        self.reversals.lock().await.len()
    }
}

#[async_trait]
impl LedgerPoster for RecordingPoster {
    async fn post_adjustment(
        &self,
        classification: &DifferenceClassification,
        bank_transaction_id: Uuid,
    ) -> Result<String, AppError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::BadGateway(
                "ledger service unavailable".to_string(),
            ));
        }
        self.adjustments
            .lock()
            .await
            .push((bank_transaction_id, classification.clone()));
        Ok(format!("JE-{}", bank_transaction_id))
    }

    async fn post_reversal(&self, pair: &ReversalPair) -> Result<String, AppError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::BadGateway(
                "ledger service unavailable".to_string(),
            ));
        }
        self.reversals.lock().await.push(pair.clone());
        Ok(format!("JE-REV-{}", pair.reversal_transaction_id))
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub company_id: Uuid,
    pub store: Arc<MemoryStore>,
    pub candidates: Arc<StaticCandidateSource>,
    pub poster: Arc<RecordingPoster>,
}

/// Spawn a test application on a random port with in-memory dependencies.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let candidates = Arc::new(StaticCandidateSource::new());
    let poster = Arc::new(RecordingPoster::default());

    let app = Application::build_with_dependencies(
        test_config(),
        store.clone(),
        store.clone(),
        candidates.clone(),
        poster.clone(),
    )
    .await
    .expect("Failed to build application");

    let port = app.port();
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let address = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    // Wait for the server to accept connections.
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", address)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server did not come up after 20 attempts: {}", e),
        }
    }

    TestApp {
        address,
        client,
        company_id: Uuid::new_v4(),
        store,
        candidates,
        poster,
    }
}

impl TestApp {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("X-Company-Id", self.company_id.to_string())
            .header("X-User-Id", "test-user")
            .send()
            .await
            .expect("Failed to execute GET request")
    }

    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("X-Company-Id", self.company_id.to_string())
            .header("X-User-Id", "test-user")
            .json(body)
            .send()
            .await
            .expect("Failed to execute POST request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.address, path))
            .header("X-Company-Id", self.company_id.to_string())
            .header("X-User-Id", "test-user")
            .send()
            .await
            .expect("Failed to execute DELETE request")
    }

    /// Ingest a transaction and return its id.
    pub async fn ingest_transaction(
        &self,
        bank_account_id: Uuid,
        direction: &str,
        amount: &str,
        transaction_date: &str,
        description: &str,
        reference: Option<&str>,
    ) -> Uuid {
        let response = self
            .post(
                "/transactions",
                &serde_json::json!({
                    "bank_account_id": bank_account_id,
                    "transaction_date": transaction_date,
                    "description": description,
                    "reference": reference,
                    "direction": direction,
                    "amount": amount,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "transaction ingest failed");
        let body: serde_json::Value = response.json().await.expect("invalid ingest response");
        Uuid::parse_str(body["transaction_id"].as_str().expect("missing id")).expect("bad id")
    }

    /// Reconcile a transaction with no difference attached.
    pub async fn reconcile_plain(&self, transaction_id: Uuid) -> reqwest::Response {
        self.post(
            &format!("/transactions/{}/reconcile", transaction_id),
            &serde_json::json!({
                "reconciled_type": "payment",
                "reconciled_id": Uuid::new_v4().to_string(),
                "reconciled_by": "test-user",
            }),
        )
        .await
    }
}
