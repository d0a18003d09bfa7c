//! netdiag Core
//!
//! Data model, error types, configuration builder and collaborator traits for
//! the netdiag workspace. This crate has no dependency on storage, HTTP or
//! LLM code; the engine in the root crate and the LLM classifier in
//! `netdiag-llm` both build on it.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `layer` - Troubleshooting layers and evidence sources with their confidence caps
//! - `context` - Structured fault description (`DiagnosisContext`)
//! - `decision` - Guard output (`GuardDecision`, `QueryType`)
//! - `task` - Worker input and output (`DiagnosisTask`, `DiagnosisResult`)
//! - `state` - Supervisor bookkeeping (`SupervisorState`, `LayerStatus`)
//! - `report` - Final artifact (`DiagnosisReport`)
//! - `builders` - Validated configuration (`DiagnosisConfigBuilder`)
//! - `collaborators` - Traits for classifier, telemetry, scoping and approval backends
//!
//! ## Design Principles
//!
//! 1. **Serializable state** - everything a suspended session needs round-trips through JSON
//! 2. **Trait-based collaborators** - backends are injected, never global
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod error;
pub mod layer;
pub mod context;
pub mod decision;
pub mod task;
pub mod state;
pub mod report;
pub mod builders;
pub mod collaborators;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Layers & Evidence ──────────────────────────────────────────────────
pub use layer::{EvidenceSource, Layer, HISTORICAL_CONFIDENCE_CAP, REALTIME_CONFIDENCE_CAP};

// ── Guard Model ────────────────────────────────────────────────────────
pub use context::{DiagnosisContext, SymptomType};
pub use decision::{GuardDecision, QueryType, MISSING_DEVICE, MISSING_SYMPTOM, STANDARD_REDIRECT};

// ── Supervisor Model ───────────────────────────────────────────────────
pub use task::{DiagnosisResult, DiagnosisTask, NO_CONFIDENCE, TOOL_FAILURE_CONFIDENCE};
pub use state::{
    DiagnosisPhase, IncompleteReason, LayerStatus, PendingApproval, RootCauseHypothesis,
    SupervisorState,
};

// ── Report ─────────────────────────────────────────────────────────────
pub use report::{DeviceStatus, DeviceSummary, DiagnosisReport, UNSCOPED_DEVICE};

// ── Configuration ──────────────────────────────────────────────────────
pub use builders::{ClassificationFailurePolicy, DiagnosisConfig, DiagnosisConfigBuilder};

// ── Collaborators ──────────────────────────────────────────────────────
pub use collaborators::{
    ApprovalDecision, ApprovalGate, ApprovalPolicy, ApprovalStatus, EmptyKnowledgeBase,
    EmptySyslog, KnowledgeBase, NeverRequireApproval, PendingApprovalGate, PriorFinding,
    QueryOutcome, QueryRequest, RealtimeRequiresApproval, StructuredClassifier, SyslogSearch,
    TelemetryQuery, TimeWindow,
};
