//! Service layer: LMS transport, passback orchestration, reconciliation

pub mod outcome_client;
pub mod passback;
pub mod reconciliation;

pub use outcome_client::{OutcomeClient, OutcomeError};
pub use passback::{PassbackError, PassbackOrchestrator, PassbackReport};
pub use reconciliation::{ReconciliationSweep, SweepSummary};
