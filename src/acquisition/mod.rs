//! Acquisition: the attempt loop, its backoff and its records

pub mod backoff;
pub mod engine;
pub mod record;

pub use self::backoff::BackoffPolicy;
pub use engine::{AcquisitionLoop, AcquisitionSettings, PurchaseFlow, SubmitOutcome};
pub use record::{AttemptRecord, FailureReason, FinalOutcome, RunSummary};
