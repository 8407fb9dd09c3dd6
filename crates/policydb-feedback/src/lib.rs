//! Persistence and adaptation around the ranking engine: the versioned
//! weight store, the append-only feedback ledger, and the bounded tuner.

pub mod ledger;
pub mod store;
pub mod tuner;

pub use ledger::FeedbackLedger;
pub use store::{TuningProvenance, WeightStore};
pub use tuner::{tune, TunerConfig, TuningDecision, WeightChange};
