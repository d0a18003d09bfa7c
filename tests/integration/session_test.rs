//! Diagnosis Session Integration Tests
//!
//! The public session API over SQLite checkpoints:
//! - Redirect, clarification and rejection are never stored
//! - A session suspended for approval survives a new service instance
//! - Approve and reject paths of `resume_diagnosis`
//! - `get_report` is stable across calls
//! - Only one resume drives a waiting session
//! - Cancelling in-flight runs leaves later runs alone

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use tokio::sync::Notify;

use netdiag::storage::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
use netdiag::{AppError, DiagnosisSettings, ResumeOutcome, SessionStatus, StartOutcome};
use netdiag_core::{ApprovalDecision, DiagnosisPhase, Layer, QueryOutcome};

use crate::support::{service, ScriptedTelemetry};

const FAULT: &str = "R3 无法访问 10.0.100.100";

fn approval_settings() -> DiagnosisSettings {
    DiagnosisSettings {
        require_realtime_approval: true,
        ..Default::default()
    }
}

fn historical() -> Arc<ScriptedTelemetry> {
    ScriptedTelemetry::candidate_on("historical", Layer::L3, "ACL 101 on R3 drops traffic to 10.0.100.0/24", 0.6)
}

fn realtime() -> Arc<ScriptedTelemetry> {
    ScriptedTelemetry::new("realtime", |_| {
        Ok(QueryOutcome::new(vec!["R3 ACL 101 deny ip any 10.0.100.0 0.0.0.255 (hits 1832)".into()], 0.9)
            .conclusive())
    })
}

#[tokio::test]
async fn test_non_diagnostic_requests_are_not_stored() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let svc = service(&DiagnosisSettings::default(), historical(), realtime(), store);

    let start = svc.start_diagnosis("查询 R1 接口状态", None).await.unwrap();
    assert_eq!(start.outcome, StartOutcome::Redirected { mode: "standard".into() });
    assert!(matches!(svc.session_status(&start.session_id), Err(AppError::NotFound(_))));

    let start = svc.start_diagnosis("网络有问题", None).await.unwrap();
    match start.outcome {
        StartOutcome::ClarificationNeeded { prompt, missing } => {
            assert!(!prompt.is_empty());
            assert!(missing.contains(&"source_device_or_target".to_string()));
        }
        other => panic!("expected clarification, got {:?}", other),
    }
    assert!(matches!(svc.get_report(&start.session_id), Err(AppError::NotFound(_))));

    let start = svc.start_diagnosis("tell me a joke", None).await.unwrap();
    assert_eq!(start.outcome, StartOutcome::Rejected);
}

#[tokio::test]
async fn test_completed_session_report_is_stable() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let svc = service(&DiagnosisSettings::default(), historical(), realtime(), store);

    let start = svc.start_diagnosis(FAULT, None).await.unwrap();
    let report = match start.outcome {
        StartOutcome::Completed(report) => report,
        other => panic!("expected a report, got {:?}", other),
    };
    assert_eq!(report.confidence, 0.9);
    assert_eq!(report.root_cause_layer, Some(Layer::L3));

    let first = serde_json::to_string(&svc.get_report(&start.session_id).unwrap()).unwrap();
    let second = serde_json::to_string(&svc.get_report(&start.session_id).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, serde_json::to_string(&report).unwrap());

    let overview = svc.session_status(&start.session_id).unwrap();
    assert_eq!(overview.status, SessionStatus::Completed);
    assert_eq!(overview.phase, DiagnosisPhase::Done);
}

#[tokio::test]
async fn test_approval_resumes_in_another_service_instance() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("sessions.db");

    let session_id = {
        let store: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
        let svc = service(&approval_settings(), historical(), realtime(), store);
        let start = svc.start_diagnosis(FAULT, None).await.unwrap();
        let expected = format!("{}:r0:L3:realtime", start.session_id);
        assert_eq!(start.outcome, StartOutcome::AwaitingApproval { task_ids: vec![expected.clone()] });

        let overview = svc.session_status(&start.session_id).unwrap();
        assert_eq!(overview.status, SessionStatus::AwaitingApproval);
        assert_eq!(overview.pending_task_ids, vec![expected]);
        assert!(matches!(svc.get_report(&start.session_id), Err(AppError::InvalidState(_))));
        start.session_id
    };

    let realtime = realtime();
    let store: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
    let svc = service(&approval_settings(), historical(), realtime.clone(), store);
    let outcome = svc
        .resume_diagnosis(&session_id, ApprovalDecision::Approved)
        .await
        .unwrap();

    let report = match outcome {
        ResumeOutcome::Completed(report) => report,
        other => panic!("expected a report, got {:?}", other),
    };
    assert_eq!(realtime.calls(), 1);
    assert!(report.complete);
    assert_eq!(report.confidence, 0.9);
    assert_eq!(report.root_cause_device.as_deref(), Some("R3"));
    assert_eq!(svc.get_report(&session_id).unwrap(), report);

    let again = svc.resume_diagnosis(&session_id, ApprovalDecision::Approved).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_rejection_continues_without_live_data() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let realtime = realtime();
    let settings = DiagnosisSettings {
        max_rounds: 2,
        ..approval_settings()
    };
    let svc = service(&settings, historical(), realtime.clone(), store);

    let start = svc.start_diagnosis(FAULT, None).await.unwrap();
    assert!(matches!(start.outcome, StartOutcome::AwaitingApproval { .. }));

    let outcome = svc
        .resume_diagnosis(&start.session_id, ApprovalDecision::Rejected)
        .await
        .unwrap();
    let report = match outcome {
        ResumeOutcome::Completed(report) => report,
        other => panic!("expected a report, got {:?}", other),
    };
    assert_eq!(realtime.calls(), 0);
    assert!(!report.complete);
    assert!(report.root_cause.contains("diagnosis incomplete"));
    assert!(report.evidence_chain.iter().any(|e| e.contains("approval rejected")));
}

#[tokio::test]
async fn test_unknown_session() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let svc = service(&DiagnosisSettings::default(), historical(), realtime(), store);
    let err = svc
        .resume_diagnosis("no-such-session", ApprovalDecision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_external_device_scope_overrides_context() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let realtime = realtime();
    let svc = service(&approval_settings(), historical(), realtime, store.clone());

    let path = vec!["R3".to_string(), "R4".to_string(), "10.0.100.100".to_string()];
    let start = svc.start_diagnosis(FAULT, Some(path.clone())).await.unwrap();
    let checkpoint = store.load(&start.session_id).unwrap().unwrap();
    assert_eq!(checkpoint.state.device_scope, path);
}

/// Telemetry whose first call blocks until released; later calls answer at once.
fn blocking_first_call(
    name: &str,
    entered: Arc<Notify>,
    outcome: impl Fn() -> QueryOutcome + Send + Sync + 'static,
) -> (Arc<ScriptedTelemetry>, mpsc::Sender<()>) {
    let (release, wait) = mpsc::channel::<()>();
    let wait = Mutex::new(wait);
    let blocked = AtomicBool::new(false);
    let telemetry = ScriptedTelemetry::new(name, move |_| {
        if !blocked.swap(true, Ordering::SeqCst) {
            entered.notify_one();
            let _ = wait.lock().unwrap().recv();
        }
        Ok(outcome())
    });
    (telemetry, release)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_resume_is_refused() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let entered = Arc::new(Notify::new());
    let (realtime, release) = blocking_first_call("realtime", entered.clone(), || {
        QueryOutcome::new(vec!["R3 ACL 101 deny ip any 10.0.100.0 0.0.0.255".into()], 0.9).conclusive()
    });
    let svc = Arc::new(service(&approval_settings(), historical(), realtime.clone(), store));

    let start = svc.start_diagnosis(FAULT, None).await.unwrap();
    assert!(matches!(start.outcome, StartOutcome::AwaitingApproval { .. }));
    let session_id = start.session_id;

    let first = {
        let svc = svc.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move { svc.resume_diagnosis(&session_id, ApprovalDecision::Approved).await })
    };
    entered.notified().await;

    let second = svc.resume_diagnosis(&session_id, ApprovalDecision::Approved).await;
    assert!(matches!(second, Err(AppError::InvalidState(_))));
    assert_eq!(svc.session_status(&session_id).unwrap().status, SessionStatus::Running);
    assert!(matches!(svc.get_report(&session_id), Err(AppError::InvalidState(_))));

    release.send(()).unwrap();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, ResumeOutcome::Completed(_)));
    assert_eq!(realtime.calls(), 1);
    assert_eq!(svc.session_status(&session_id).unwrap().status, SessionStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_running_spares_later_sessions() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let entered = Arc::new(Notify::new());
    let (historical, release) = blocking_first_call("historical", entered.clone(), || {
        QueryOutcome::new(vec!["counters within baseline".into()], 0.1)
    });
    let settings = DiagnosisSettings {
        max_rounds: 1,
        ..Default::default()
    };
    let svc = Arc::new(service(&settings, historical, realtime(), store));

    let running = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.start_diagnosis(FAULT, None).await })
    };
    entered.notified().await;
    svc.cancel_running().unwrap();
    release.send(()).unwrap();

    let cancelled = match running.await.unwrap().unwrap().outcome {
        StartOutcome::Completed(report) => report,
        other => panic!("expected a report, got {:?}", other),
    };
    assert!(cancelled.tags.contains(&"incomplete:cancelled".to_string()));

    let later = match svc.start_diagnosis(FAULT, None).await.unwrap().outcome {
        StartOutcome::Completed(report) => report,
        other => panic!("expected a report, got {:?}", other),
    };
    assert!(later.tags.contains(&"incomplete:round_budget_exhausted".to_string()));
}
