//! Supervisor State
//!
//! `SupervisorState` is the single source of truth for one diagnosis session.
//! It is created from a `DiagnosisContext` at session start, mutated only by
//! the Supervisor, checkpointed while a session waits for approval, and
//! finally consumed by the report synthesizer.
//!
//! Per-layer confidence only ever goes up: `LayerStatus::merge` keeps the
//! maximum of the stored and incoming confidence, so a later round can never
//! erase certainty established earlier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layer::{EvidenceSource, Layer};
use crate::task::{DiagnosisResult, DiagnosisTask};

/// Running state of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStatus {
    pub layer: Layer,
    pub confidence: f64,
    pub findings: Vec<String>,
    pub investigated: bool,
}

impl LayerStatus {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            confidence: 0.0,
            findings: Vec::new(),
            investigated: false,
        }
    }

    /// Monotonic-maximum confidence update.
    pub fn merge_confidence(&mut self, confidence: f64) {
        if confidence > self.confidence {
            self.confidence = confidence;
        }
    }

    /// Integrate a worker result. Returns `true` when this is the first
    /// result for the layer.
    pub fn merge(&mut self, result: &DiagnosisResult) -> bool {
        let first = !self.investigated;
        self.merge_confidence(result.confidence);
        self.findings.extend(result.findings.iter().cloned());
        self.investigated = true;
        first
    }
}

/// Phase of the diagnosis loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisPhase {
    Scoping,
    Diagnosing,
    Verifying,
    Reporting,
    Done,
}

/// Why a session ended without a confirmed root cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// All rounds were spent
    RoundBudgetExhausted,
    /// The session wall-clock budget ran out
    SessionTimeout,
    /// The run was cancelled by the caller
    Cancelled,
    /// No layer was left to investigate
    NoCandidateLayers,
}

impl IncompleteReason {
    /// Whether the session was cut short (as opposed to running its course).
    pub fn is_interrupted(&self) -> bool {
        matches!(self, IncompleteReason::SessionTimeout | IncompleteReason::Cancelled)
    }
}

/// The current root-cause hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCauseHypothesis {
    pub layer: Layer,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub confidence: f64,
    pub source: EvidenceSource,
}

impl RootCauseHypothesis {
    /// Whether the hypothesis still needs realtime verification.
    pub fn needs_verification(&self) -> bool {
        self.source == EvidenceSource::Historical
    }
}

/// A batch of tasks suspended until a human decides on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    /// Phase the batch belongs to (`Diagnosing` or `Verifying`)
    pub phase: DiagnosisPhase,
    pub tasks: Vec<DiagnosisTask>,
}

impl PendingApproval {
    /// Ids of the tasks that are waiting on the approval gate.
    pub fn gated_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.requires_approval)
            .map(|t| t.id.clone())
            .collect()
    }
}

/// Full state of one diagnosis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorState {
    pub session_id: String,
    pub round: u32,
    pub max_rounds: u32,
    pub layer_statuses: BTreeMap<Layer, LayerStatus>,
    pub root_cause_found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_layer: Option<Layer>,
    pub terminated: bool,
    pub awaiting_approval: bool,
    pub phase: DiagnosisPhase,
    /// Devices every task is scoped to
    pub device_scope: Vec<String>,
    /// Layers the assign step considers, in physical order
    pub candidate_layers: Vec<Layer>,
    /// Layers in the order they first received a worker result
    pub investigation_order: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<RootCauseHypothesis>,
    /// Layers whose historical hypothesis was refuted by realtime evidence
    #[serde(default)]
    pub contradicted_layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingApproval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_reason: Option<IncompleteReason>,
    /// Wall-clock time spent in the loop, carried across resumes
    #[serde(default)]
    pub elapsed_ms: u64,
    /// Round-0 findings not tied to a layer
    #[serde(default)]
    pub scoping_notes: Vec<String>,
}

impl SupervisorState {
    /// Fresh state with an uninvestigated entry for every layer.
    pub fn new(session_id: impl Into<String>, max_rounds: u32, device_scope: Vec<String>) -> Self {
        let layer_statuses = Layer::ALL
            .iter()
            .map(|layer| (*layer, LayerStatus::new(*layer)))
            .collect();
        Self {
            session_id: session_id.into(),
            round: 0,
            max_rounds,
            layer_statuses,
            root_cause_found: false,
            root_cause_layer: None,
            terminated: false,
            awaiting_approval: false,
            phase: DiagnosisPhase::Scoping,
            device_scope,
            candidate_layers: Layer::ALL.to_vec(),
            investigation_order: Vec::new(),
            hypothesis: None,
            contradicted_layers: Vec::new(),
            pending: None,
            incomplete_reason: None,
            elapsed_ms: 0,
            scoping_notes: Vec::new(),
        }
    }

    /// Status of one layer.
    pub fn layer(&self, layer: Layer) -> Option<&LayerStatus> {
        self.layer_statuses.get(&layer)
    }

    /// Mutable status of one layer, created on demand.
    pub fn layer_mut(&mut self, layer: Layer) -> &mut LayerStatus {
        self.layer_statuses
            .entry(layer)
            .or_insert_with(|| LayerStatus::new(layer))
    }

    /// Confidence of one layer (0 when unknown).
    pub fn layer_confidence(&self, layer: Layer) -> f64 {
        self.layer(layer).map(|s| s.confidence).unwrap_or(0.0)
    }

    /// Highest confidence reached by any layer.
    pub fn max_confidence(&self) -> f64 {
        self.layer_statuses
            .values()
            .map(|s| s.confidence)
            .fold(0.0_f64, f64::max)
    }

    /// Integrate a result into its layer and record investigation order.
    pub fn integrate(&mut self, result: &DiagnosisResult) {
        let first = self.layer_mut(result.layer).merge(result);
        if first && !self.investigation_order.contains(&result.layer) {
            self.investigation_order.push(result.layer);
        }
    }

    /// Record a hypothesis and raise the root-cause flags.
    pub fn set_hypothesis(&mut self, hypothesis: RootCauseHypothesis) {
        self.root_cause_found = true;
        self.root_cause_layer = Some(hypothesis.layer);
        self.hypothesis = Some(hypothesis);
    }

    /// Drop the current hypothesis without touching stored confidence.
    pub fn clear_root_cause(&mut self) {
        if let Some(hypothesis) = self.hypothesis.take() {
            if !self.contradicted_layers.contains(&hypothesis.layer) {
                self.contradicted_layers.push(hypothesis.layer);
            }
        }
        self.root_cause_found = false;
        self.root_cause_layer = None;
    }

    /// Whether the root cause is confirmed and needs no further work.
    pub fn root_cause_confirmed(&self) -> bool {
        self.root_cause_found
            && self
                .hypothesis
                .as_ref()
                .is_some_and(|h| !h.needs_verification())
    }

    /// Whether another round fits in the budget.
    pub fn has_rounds_left(&self) -> bool {
        self.round + 1 < self.max_rounds
    }
}
