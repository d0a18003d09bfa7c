//! Supervisor Integration Tests
//!
//! The diagnosis loop with real workers over scripted telemetry:
//! - Round budget exhaustion with uniformly weak evidence
//! - Historical hypothesis corroborated by realtime verification
//! - Approval gate answering without a suspension
//! - Prior findings narrowing the first round
//! - Session wall-clock budget

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use netdiag::services::report::ReportSynthesizer;
use netdiag::services::supervisor::{Supervisor, SupervisorOutcome};
use netdiag::services::worker::{HistoricalWorker, RealtimeWorker};
use netdiag_core::{
    ApprovalStatus, CoreResult, DiagnosisConfig, DiagnosisConfigBuilder, DiagnosisContext,
    EvidenceSource, IncompleteReason, KnowledgeBase, Layer, PriorFinding, QueryOutcome,
    RealtimeRequiresApproval, SupervisorState,
};

use crate::support::{ScriptedGate, ScriptedTelemetry};

fn supervisor(
    config: DiagnosisConfig,
    historical: Arc<ScriptedTelemetry>,
    realtime: Arc<ScriptedTelemetry>,
) -> Supervisor {
    let tool_calls = config.max_tool_calls;
    Supervisor::new(
        config,
        Arc::new(HistoricalWorker::new(historical, tool_calls)),
        Arc::new(RealtimeWorker::new(realtime, tool_calls)),
    )
    .unwrap()
}

fn context() -> DiagnosisContext {
    DiagnosisContext::new("R3 无法访问 10.0.100.100")
        .with_source("R3")
        .with_target("10.0.100.100")
}

async fn run(supervisor: &Supervisor, ctx: &DiagnosisContext) -> (SupervisorState, SupervisorOutcome) {
    let mut state = supervisor.init_state("session-1", ctx, None).unwrap();
    let outcome = supervisor
        .run(&mut state, ctx, &CancellationToken::new())
        .await
        .unwrap();
    (state, outcome)
}

#[tokio::test]
async fn test_weak_evidence_exhausts_round_budget() {
    let config = DiagnosisConfigBuilder::new().max_rounds(3).build().unwrap();
    let s = supervisor(
        config,
        ScriptedTelemetry::flat("historical", 0.3),
        ScriptedTelemetry::flat("realtime", 0.3),
    );
    let ctx = context();
    let (state, outcome) = run(&s, &ctx).await;

    assert_eq!(outcome, SupervisorOutcome::Finished);
    assert!(!state.root_cause_found);
    assert!(state.terminated);
    assert!(state.round <= state.max_rounds);
    assert_eq!(state.round, 2);

    let report = ReportSynthesizer::synthesize(&state, &ctx);
    assert!(!report.complete);
    assert!(report.root_cause.contains("diagnosis incomplete"));
    assert!(report.confidence <= 0.3);
}

#[tokio::test]
async fn test_realtime_corroborates_historical_hypothesis() {
    let historical = ScriptedTelemetry::candidate_on("historical", Layer::L3, "ACL 101 drops ICMP to 10.0.100.0/24", 0.6);
    let realtime = ScriptedTelemetry::new("realtime", |req| {
        assert_eq!(req.layer, Layer::L3);
        Ok(QueryOutcome::new(vec!["ACL 101 line 20 deny icmp any 10.0.100.0 0.0.0.255".into()], 0.9)
            .conclusive())
    });
    let s = supervisor(DiagnosisConfig::default(), historical, realtime.clone());
    let ctx = context();
    let (state, _) = run(&s, &ctx).await;

    assert!(state.root_cause_found);
    assert_eq!(state.root_cause_layer, Some(Layer::L3));
    assert_eq!(realtime.calls(), 1);
    let hypothesis = state.hypothesis.as_ref().unwrap();
    assert_eq!(hypothesis.source, EvidenceSource::Realtime);

    let report = ReportSynthesizer::synthesize(&state, &ctx);
    assert!(report.complete);
    assert_eq!(report.confidence, 0.9);
    assert_eq!(report.root_cause_layer, Some(Layer::L3));
    assert_eq!(report.root_cause, "ACL 101 drops ICMP to 10.0.100.0/24");
    assert_eq!(report.root_cause_device.as_deref(), Some("R3"));
}

#[tokio::test]
async fn test_historical_evidence_never_exceeds_cap() {
    let historical = ScriptedTelemetry::new("historical", |req| {
        Ok(QueryOutcome::new(vec![format!("{} saturated", req.layer)], 1.0).conclusive())
    });
    let config = DiagnosisConfigBuilder::new().max_rounds(2).build().unwrap();
    let s = supervisor(config, historical, ScriptedTelemetry::flat("realtime", 0.1));
    let (state, _) = run(&s, &context()).await;
    for status in state.layer_statuses.values() {
        assert!(status.confidence <= 0.60);
    }
}

#[tokio::test]
async fn test_gate_approval_runs_without_suspending() {
    let gate = Arc::new(ScriptedGate::default());
    gate.set("session-1:r0:L1:realtime", ApprovalStatus::Approved);

    let s = supervisor(
        DiagnosisConfig::default(),
        ScriptedTelemetry::candidate_on("historical", Layer::L1, "optic on R3 Gi0/1 degrading", 0.6),
        ScriptedTelemetry::new("realtime", |_| {
            Ok(QueryOutcome::new(vec!["rx power -28 dBm".into()], 0.85).conclusive())
        }),
    )
    .with_approval_gate(gate)
    .with_approval_policy(Arc::new(RealtimeRequiresApproval));

    let (state, outcome) = run(&s, &context()).await;
    assert_eq!(outcome, SupervisorOutcome::Finished);
    assert!(state.root_cause_confirmed());
    assert_eq!(state.hypothesis.unwrap().confidence, 0.85);
}

#[tokio::test]
async fn test_gate_rejection_contradicts_hypothesis() {
    let gate = Arc::new(ScriptedGate::default());
    gate.set("session-1:r0:L1:realtime", ApprovalStatus::Rejected);

    let config = DiagnosisConfigBuilder::new().max_rounds(2).build().unwrap();
    let s = supervisor(
        config,
        ScriptedTelemetry::candidate_on("historical", Layer::L1, "optic degrading", 0.6),
        ScriptedTelemetry::flat("realtime", 0.9),
    )
    .with_approval_gate(gate)
    .with_approval_policy(Arc::new(RealtimeRequiresApproval));

    let ctx = context();
    let (state, _) = run(&s, &ctx).await;
    assert!(!state.root_cause_found);
    assert_eq!(state.contradicted_layers, vec![Layer::L1]);
    let report = ReportSynthesizer::synthesize(&state, &ctx);
    assert!(report.evidence_chain.iter().any(|e| e.contains("approval rejected")));
}

struct StaticKnowledgeBase(Vec<PriorFinding>);

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
    async fn search(&self, _symptom: &str) -> CoreResult<Vec<PriorFinding>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_prior_findings_seed_and_narrow() {
    let kb = StaticKnowledgeBase(vec![
        PriorFinding::new(Some(Layer::L2), "R3 lost its default route last week", 0.9),
        PriorFinding::new(None, "similar ticket closed as ISP outage", 0.4),
    ]);
    let historical = ScriptedTelemetry::flat("historical", 0.2);
    let config = DiagnosisConfigBuilder::new().max_rounds(1).build().unwrap();
    let s = supervisor(config, historical.clone(), ScriptedTelemetry::flat("realtime", 0.1))
        .with_knowledge_base(Arc::new(kb));

    let (state, _) = run(&s, &context()).await;
    assert_eq!(state.candidate_layers, vec![Layer::L2]);
    assert_eq!(state.investigation_order, vec![Layer::L2]);
    // Seeded confidence is capped like any historical evidence.
    assert_eq!(state.layer_confidence(Layer::L2), 0.60);
    assert_eq!(state.scoping_notes, vec!["similar ticket closed as ISP outage".to_string()]);
}

#[tokio::test]
async fn test_session_budget_forces_partial_report() {
    let slow = ScriptedTelemetry::new("historical", |req| {
        std::thread::sleep(Duration::from_millis(30));
        Ok(QueryOutcome::new(vec![format!("{} sample {}", req.layer, req.iteration)], 0.2))
    });
    let config = DiagnosisConfigBuilder::new()
        .max_rounds(5)
        .per_round_timeout(Duration::from_millis(10))
        .build()
        .unwrap();
    let s = supervisor(config, slow, ScriptedTelemetry::flat("realtime", 0.1));
    let ctx = context();
    let (state, outcome) = run(&s, &ctx).await;

    assert_eq!(outcome, SupervisorOutcome::Finished);
    assert_eq!(state.incomplete_reason, Some(IncompleteReason::SessionTimeout));
    assert!(state.terminated);
    let report = ReportSynthesizer::synthesize(&state, &ctx);
    assert_eq!(report.root_cause, "diagnosis incomplete, partial findings below");
}
