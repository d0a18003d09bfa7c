//! Investigation Workers
//!
//! A worker executes one `DiagnosisTask` against its telemetry backend and
//! returns exactly one `DiagnosisResult`. Two variants exist, selected by
//! `DiagnosisTask::source`:
//!
//! - `HistoricalWorker` - periodically collected telemetry, capped at 0.60
//! - `RealtimeWorker` - live device queries, capped at 0.95
//!
//! Both run the same bounded loop: the first call is driven by the task
//! description, later calls follow up on the newest finding. The loop ends
//! on a conclusive answer, when a call adds nothing new, on a tool error,
//! or after `max_tool_calls` calls. An inconclusive loop only earns half of
//! the source ceiling.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use netdiag_core::{
    DiagnosisResult, DiagnosisTask, EvidenceSource, QueryRequest, TelemetryQuery,
    TOOL_FAILURE_CONFIDENCE,
};

/// Executes a single diagnosis task.
#[async_trait]
pub trait InvestigationWorker: Send + Sync {
    /// Evidence source this worker produces.
    fn source(&self) -> EvidenceSource;

    /// Run the task. Failures are reported inside the result, never as errors.
    async fn run(&self, task: &DiagnosisTask) -> DiagnosisResult;
}

/// Worker over periodically collected telemetry.
pub struct HistoricalWorker {
    tool: Arc<dyn TelemetryQuery>,
    max_tool_calls: u32,
}

impl HistoricalWorker {
    pub fn new(tool: Arc<dyn TelemetryQuery>, max_tool_calls: u32) -> Self {
        Self { tool, max_tool_calls }
    }
}

#[async_trait]
impl InvestigationWorker for HistoricalWorker {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Historical
    }

    async fn run(&self, task: &DiagnosisTask) -> DiagnosisResult {
        investigate(self.tool.as_ref(), self.source(), self.max_tool_calls, task).await
    }
}

/// Worker over live device and configuration queries.
pub struct RealtimeWorker {
    tool: Arc<dyn TelemetryQuery>,
    max_tool_calls: u32,
}

impl RealtimeWorker {
    pub fn new(tool: Arc<dyn TelemetryQuery>, max_tool_calls: u32) -> Self {
        Self { tool, max_tool_calls }
    }
}

#[async_trait]
impl InvestigationWorker for RealtimeWorker {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Realtime
    }

    async fn run(&self, task: &DiagnosisTask) -> DiagnosisResult {
        investigate(self.tool.as_ref(), self.source(), self.max_tool_calls, task).await
    }
}

/// How the tool loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Conclusive,
    Stalled,
    CallBudget,
    ToolFailed,
}

async fn investigate(
    tool: &dyn TelemetryQuery,
    source: EvidenceSource,
    max_tool_calls: u32,
    task: &DiagnosisTask,
) -> DiagnosisResult {
    let ceiling = source.cap();
    let mut findings: Vec<String> = Vec::new();
    let mut best = 0.0_f64;
    let mut candidate: Option<String> = None;
    let mut device: Option<String> = None;
    let mut hint = task.description.clone();
    let mut end = LoopEnd::CallBudget;
    let mut calls = 0;

    for iteration in 0..max_tool_calls {
        let request = QueryRequest {
            device_scope: task.device_scope.clone(),
            layer: task.layer,
            hint: hint.clone(),
            iteration,
        };
        calls += 1;

        let outcome = match tool.query(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(task_id = %task.id, tool = tool.name(), error = %e, "Telemetry tool failed");
                findings.push(format!("tool {} failed: {}", tool.name(), e));
                end = LoopEnd::ToolFailed;
                break;
            }
        };

        let conclusive = outcome.is_conclusive();
        best = best.max(source.clamp(outcome.confidence_hint));
        if outcome.root_cause_candidate.is_some() {
            candidate = outcome.root_cause_candidate;
            device = outcome.device;
        }

        let mut newest: Option<String> = None;
        for finding in outcome.findings {
            if !findings.contains(&finding) {
                newest = Some(finding.clone());
                findings.push(finding);
            }
        }

        if conclusive {
            end = LoopEnd::Conclusive;
            break;
        }
        match newest {
            Some(latest) => hint = format!("follow up on: {}", latest),
            None => {
                end = LoopEnd::Stalled;
                break;
            }
        }
    }

    let confidence = match end {
        LoopEnd::ToolFailed => best.min(TOOL_FAILURE_CONFIDENCE),
        LoopEnd::Conclusive => best.min(ceiling),
        LoopEnd::Stalled | LoopEnd::CallBudget => best.min(ceiling / 2.0),
    };
    debug!(
        task_id = %task.id,
        layer = %task.layer,
        calls,
        end = ?end,
        confidence,
        "Worker finished"
    );

    let mut result = DiagnosisResult::new(task.layer, source, findings, confidence);
    if end == LoopEnd::Conclusive {
        if let Some(candidate) = candidate {
            result = result.with_candidate(candidate);
            if let Some(device) = device {
                result = result.with_device(device);
            }
        }
    }
    result
}
