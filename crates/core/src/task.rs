//! Diagnosis Tasks and Results
//!
//! A `DiagnosisTask` is one unit of work the Supervisor hands to a worker; a
//! `DiagnosisResult` is what comes back. Tasks are consumed exactly once and
//! live only as long as the session (or its pending-approval checkpoint).

use serde::{Deserialize, Serialize};

use crate::layer::{EvidenceSource, Layer};

/// Confidence reported for a task that could not run (timeout, rejection).
pub const NO_CONFIDENCE: f64 = 0.0;

/// Upper bound on the confidence of a result whose tool failed.
pub const TOOL_FAILURE_CONFIDENCE: f64 = 0.2;

/// One unit of investigation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisTask {
    /// Stable identifier, also used as the approval-gate key
    pub id: String,
    pub layer: Layer,
    pub description: String,
    /// Ordered, duplicate-free device identifiers
    pub device_scope: Vec<String>,
    pub round: u32,
    /// Selects the worker variant
    pub source: EvidenceSource,
    /// Whether a human must approve the task before it runs
    #[serde(default)]
    pub requires_approval: bool,
}

impl DiagnosisTask {
    /// Create a task. The id is derived from session, round, layer and source.
    pub fn new(
        session_id: &str,
        round: u32,
        layer: Layer,
        source: EvidenceSource,
        description: impl Into<String>,
        device_scope: &[String],
    ) -> Self {
        let mut scope: Vec<String> = Vec::with_capacity(device_scope.len());
        for device in device_scope {
            if !scope.contains(device) {
                scope.push(device.clone());
            }
        }
        Self {
            id: format!("{}:r{}:{}:{}", session_id, round, layer, source),
            layer,
            description: description.into(),
            device_scope: scope,
            round,
            source,
            requires_approval: false,
        }
    }

    pub fn with_approval_required(mut self, required: bool) -> Self {
        self.requires_approval = required;
        self
    }
}

/// Output of a worker for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub layer: Layer,
    pub findings: Vec<String>,
    /// Always within `[0, source.cap()]` when built through `new`
    pub confidence: f64,
    pub source: EvidenceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_candidate: Option<String>,
    /// Device implicated by the candidate, when the tool could tell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl DiagnosisResult {
    /// Create a result, clamping confidence to the source's range.
    pub fn new(layer: Layer, source: EvidenceSource, findings: Vec<String>, confidence: f64) -> Self {
        Self {
            layer,
            findings,
            confidence: source.clamp(confidence),
            source,
            root_cause_candidate: None,
            device: None,
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

    /// Result contributed by a worker that exceeded its timeout.
    pub fn timed_out(task: &DiagnosisTask, after_ms: u64) -> Self {
        Self::new(
            task.layer,
            task.source,
            vec![format!("timeout: {} worker gave no answer within {}ms", task.source, after_ms)],
            NO_CONFIDENCE,
        )
    }

    /// Result for a task whose approval was rejected by a human.
    pub fn approval_rejected(task: &DiagnosisTask) -> Self {
        Self::new(
            task.layer,
            task.source,
            vec![format!("approval rejected for task {}", task.id)],
            NO_CONFIDENCE,
        )
    }

    /// Re-apply the source cap. Used on results from worker implementations
    /// the Supervisor does not control.
    pub fn clamped(mut self) -> Self {
        self.confidence = self.source.clamp(self.confidence);
        self
    }
}
