//! Services
//!
//! The diagnosis pipeline. `session` is the public entry point; the other
//! modules are its stages.

pub mod guard;
pub mod report;
pub mod session;
pub mod supervisor;
pub mod worker;

pub use guard::{Guard, RuleBasedClassifier};
pub use report::ReportSynthesizer;
pub use session::{DiagnosisService, DiagnosisStart, ResumeOutcome, SessionOverview, StartOutcome};
pub use supervisor::{Supervisor, SupervisorOutcome};
pub use worker::{HistoricalWorker, InvestigationWorker, RealtimeWorker};
