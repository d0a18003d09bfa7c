//! Scripted collaborators shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use netdiag::{DiagnosisService, DiagnosisSettings};
use netdiag::storage::CheckpointStore;
use netdiag_core::{
    ApprovalGate, ApprovalStatus, CoreResult, Layer, QueryOutcome, QueryRequest, TelemetryQuery,
};

type Script = Box<dyn Fn(&QueryRequest) -> CoreResult<QueryOutcome> + Send + Sync>;

/// Telemetry backend driven by a closure.
pub struct ScriptedTelemetry {
    name: String,
    script: Script,
    calls: AtomicU32,
}

impl ScriptedTelemetry {
    pub fn new(
        name: &str,
        script: impl Fn(&QueryRequest) -> CoreResult<QueryOutcome> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Box::new(script),
            calls: AtomicU32::new(0),
        })
    }

    /// Same finding and confidence for every layer and every call.
    pub fn flat(name: &str, confidence: f64) -> Arc<Self> {
        Self::new(name, move |req| {
            Ok(QueryOutcome::new(vec![format!("{} counters within baseline", req.layer)], confidence))
        })
    }

    /// A conclusive candidate on `layer`, flat low evidence elsewhere.
    pub fn candidate_on(name: &str, layer: Layer, candidate: &str, confidence: f64) -> Arc<Self> {
        let candidate = candidate.to_string();
        Self::new(name, move |req| {
            if req.layer == layer {
                Ok(QueryOutcome::new(vec![format!("{} anomaly on R3", req.layer)], confidence)
                    .with_candidate(candidate.clone())
                    .with_device("R3"))
            } else {
                Ok(QueryOutcome::new(vec![format!("{} clean", req.layer)], 0.1))
            }
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryQuery for ScriptedTelemetry {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, request: &QueryRequest) -> CoreResult<QueryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(request)
    }
}

/// Approval gate with per-task answers; unknown tasks are pending.
#[derive(Default)]
pub struct ScriptedGate {
    answers: Mutex<HashMap<String, ApprovalStatus>>,
}

impl ScriptedGate {
    pub fn set(&self, task_id: &str, status: ApprovalStatus) {
        self.answers.lock().unwrap().insert(task_id.to_string(), status);
    }
}

#[async_trait]
impl ApprovalGate for ScriptedGate {
    async fn status(&self, task_id: &str) -> ApprovalStatus {
        self.answers
            .lock()
            .unwrap()
            .get(task_id)
            .copied()
            .unwrap_or(ApprovalStatus::Pending)
    }
}

pub fn service(
    settings: &DiagnosisSettings,
    historical: Arc<ScriptedTelemetry>,
    realtime: Arc<ScriptedTelemetry>,
    store: Arc<dyn CheckpointStore>,
) -> DiagnosisService {
    DiagnosisService::from_settings(settings, historical, realtime, store).unwrap()
}
