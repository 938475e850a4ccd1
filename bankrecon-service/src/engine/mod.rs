//! The reconciliation core: scoring, suggestion ranking, difference
//! classification, reversal pairing, and allocation tracking.

pub mod allocation;
pub mod difference;
pub mod reversal;
pub mod scoring;
pub mod suggestion;

pub use allocation::AllocationTracker;
pub use difference::DifferenceClassifier;
pub use reversal::ReversalEngine;
pub use suggestion::SuggestionEngine;
