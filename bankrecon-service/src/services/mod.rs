//! Stateful services: the reconciliation store, collaborator ports, and
//! metrics.

pub mod candidates;
pub mod ledger;
pub mod metrics;
pub mod posting;
pub mod store;

pub use candidates::{CandidateSource, HttpCandidateSource, StaticCandidateSource};
pub use ledger::ReconciliationLedger;
pub use metrics::{get_metrics, init_metrics};
pub use posting::{HttpLedgerPoster, LedgerPoster};
pub use store::{AllocationStore, MemoryStore, PgStore, ReconciliationStore};
