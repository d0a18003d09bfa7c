//! Collaborator Traits
//!
//! Everything the diagnosis engine consumes but does not implement:
//!
//! - `StructuredClassifier` - intent classification and context extraction
//! - `TelemetryQuery` - historical telemetry or live device lookups
//! - `KnowledgeBase` / `SyslogSearch` - round-0 scoping sources
//! - `ApprovalGate` / `ApprovalPolicy` - human-in-the-loop approval
//!
//! All traits are object safe and `Send + Sync` so they can be shared as
//! `Arc<dyn Trait>` between the Guard, the Supervisor and its workers.
//! The empty implementations at the bottom are the defaults used when a
//! deployment has no such backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::GuardDecision;
use crate::error::CoreResult;
use crate::layer::{EvidenceSource, Layer};
use crate::task::DiagnosisTask;

// ============================================================================
// Classification
// ============================================================================

/// Turns free text into a `GuardDecision`.
///
/// Implementations may return partially filled decisions; the Guard
/// normalizes whatever comes back. Any error is treated as a
/// classification failure.
#[async_trait]
pub trait StructuredClassifier: Send + Sync {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> CoreResult<GuardDecision>;
}

// ============================================================================
// Telemetry
// ============================================================================

/// One call a worker makes against its telemetry backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub device_scope: Vec<String>,
    pub layer: Layer,
    /// What to look for: the task description first, then a follow-up
    pub hint: String,
    /// Zero-based index of this call within the worker loop
    pub iteration: u32,
}

/// What a telemetry backend returned for one call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub findings: Vec<String>,
    /// Backend's own confidence estimate; clamped by the worker
    pub confidence_hint: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_candidate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// The backend considers the question answered
    #[serde(default)]
    pub conclusive: bool,
}

impl QueryOutcome {
    pub fn new(findings: Vec<String>, confidence_hint: f64) -> Self {
        Self {
            findings,
            confidence_hint,
            ..Default::default()
        }
    }

    pub fn with_candidate(mut self, candidate: impl Into<String>) -> Self {
        self.root_cause_candidate = Some(candidate.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn conclusive(mut self) -> Self {
        self.conclusive = true;
        self
    }

    /// A root-cause candidate always ends the worker loop.
    pub fn is_conclusive(&self) -> bool {
        self.conclusive || self.root_cause_candidate.is_some()
    }
}

/// Historical (`QueryHistorical`) or realtime (`QueryRealtime`) lookup.
#[async_trait]
pub trait TelemetryQuery: Send + Sync {
    /// Tool name, used in failure findings ("tool <name> failed: ...").
    fn name(&self) -> &str;

    async fn query(&self, request: &QueryRequest) -> CoreResult<QueryOutcome>;
}

// ============================================================================
// Round-0 scoping
// ============================================================================

/// A finding known before any worker ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorFinding {
    /// Layer the finding points at; `None` for general notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    pub summary: String,
    #[serde(default)]
    pub confidence: f64,
}

impl PriorFinding {
    pub fn new(layer: Option<Layer>, summary: impl Into<String>, confidence: f64) -> Self {
        Self {
            layer,
            summary: summary.into(),
            confidence,
        }
    }

    /// Prior confidence after applying the historical cap.
    pub fn capped_confidence(&self) -> f64 {
        EvidenceSource::Historical.clamp(self.confidence)
    }
}

/// Half-open time range `[start, end)` for syslog searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The `minutes` leading up to `end`.
    pub fn ending_at(end: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start: end - chrono::Duration::minutes(i64::from(minutes)),
            end,
        }
    }

    /// The last `minutes` up to now.
    pub fn last_minutes(minutes: u32) -> Self {
        Self::ending_at(Utc::now(), minutes)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// `SearchKnowledgeBase(symptom)`.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, symptom: &str) -> CoreResult<Vec<PriorFinding>>;
}

/// `SearchSyslog(deviceScope, timeWindow)`.
#[async_trait]
pub trait SyslogSearch: Send + Sync {
    async fn search(&self, device_scope: &[String], window: &TimeWindow) -> CoreResult<Vec<PriorFinding>>;
}

// ============================================================================
// Approval
// ============================================================================

/// Current state of a task at the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    Pending,
}

/// Decision a human hands to `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalStatus {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// HITL signal source, keyed by task id.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn status(&self, task_id: &str) -> ApprovalStatus;
}

/// Decides which tasks need a human decision before they run.
pub trait ApprovalPolicy: Send + Sync {
    fn requires_approval(&self, task: &DiagnosisTask) -> bool;
}

// ============================================================================
// Default implementations
// ============================================================================

/// Knowledge base with no entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyKnowledgeBase;

#[async_trait]
impl KnowledgeBase for EmptyKnowledgeBase {
    async fn search(&self, _symptom: &str) -> CoreResult<Vec<PriorFinding>> {
        Ok(Vec::new())
    }
}

/// Syslog backend with no messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySyslog;

#[async_trait]
impl SyslogSearch for EmptySyslog {
    async fn search(&self, _device_scope: &[String], _window: &TimeWindow) -> CoreResult<Vec<PriorFinding>> {
        Ok(Vec::new())
    }
}

/// Gate that never decides on its own; every gated task waits for `resume`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingApprovalGate;

#[async_trait]
impl ApprovalGate for PendingApprovalGate {
    async fn status(&self, _task_id: &str) -> ApprovalStatus {
        ApprovalStatus::Pending
    }
}

/// No task ever needs approval.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRequireApproval;

impl ApprovalPolicy for NeverRequireApproval {
    fn requires_approval(&self, _task: &DiagnosisTask) -> bool {
        false
    }
}

/// Live device queries need approval, historical lookups do not.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealtimeRequiresApproval;

impl ApprovalPolicy for RealtimeRequiresApproval {
    fn requires_approval(&self, task: &DiagnosisTask) -> bool {
        task.source == EvidenceSource::Realtime
    }
}
