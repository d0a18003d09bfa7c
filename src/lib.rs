//! netdiag - Network Fault Diagnosis Engine
//!
//! Takes a natural-language fault report, decides whether it is a real
//! fault-diagnosis request, and runs a bounded multi-round investigation over
//! four troubleshooting layers before producing a root-cause report.
//! It includes:
//! - The entry Guard with rule-based and LLM-backed classifiers
//! - Historical and realtime investigation workers
//! - The Supervisor loop with human approval of live queries
//! - Report synthesis
//! - Storage layer (SQLite / in-memory checkpoints, JSON settings)

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::checkpoint::{SessionCheckpoint, SessionStatus};
pub use models::settings::{DiagnosisSettings, SettingsUpdate};
pub use services::{
    DiagnosisService, DiagnosisStart, Guard, HistoricalWorker, InvestigationWorker,
    RealtimeWorker, ReportSynthesizer, ResumeOutcome, RuleBasedClassifier, SessionOverview,
    StartOutcome, Supervisor, SupervisorOutcome,
};
pub use storage::{CheckpointStore, ConfigService, MemoryCheckpointStore, SqliteCheckpointStore};
pub use utils::error::{AppError, AppResult};
