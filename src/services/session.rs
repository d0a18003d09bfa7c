//! Diagnosis Session Service
//!
//! Public entry point of the engine. Ties the Guard, the Supervisor, the
//! report synthesizer and the checkpoint store together:
//!
//! - `start_diagnosis` classifies a request and, for a sufficient fault
//!   report, runs a session until it finishes or waits for approval
//! - `resume_diagnosis` continues a waiting session with a human decision
//! - `get_report` / `session_status` read stored sessions
//!
//! Only sessions that reach the Supervisor are stored. A stored session is
//! awaiting approval, running under exactly one resume, or completed with
//! its final report. Any process sharing the store can resume a waiting
//! session; the `AwaitingApproval -> Running` claim lets only one of them in.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use netdiag_core::{
    ApprovalDecision, DiagnosisContext, DiagnosisPhase, DiagnosisReport, QueryType,
    RealtimeRequiresApproval, StructuredClassifier, SupervisorState, TelemetryQuery,
    STANDARD_REDIRECT,
};
use netdiag_llm::{LlmFaultClassifier, OpenAICompatibleProvider};

use super::guard::{Guard, RuleBasedClassifier};
use super::report::ReportSynthesizer;
use super::supervisor::{Supervisor, SupervisorOutcome};
use super::worker::{HistoricalWorker, RealtimeWorker};
use crate::models::checkpoint::{SessionCheckpoint, SessionStatus};
use crate::models::settings::DiagnosisSettings;
use crate::storage::checkpoint::{CheckpointStore, SqliteCheckpointStore};
use crate::utils::error::{AppError, AppResult};

/// Result of `start_diagnosis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisStart {
    /// Generated for every request; only stored when a session ran
    pub session_id: String,
    pub outcome: StartOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartOutcome {
    /// Not a fault report; hand the request to the named flow
    Redirected { mode: String },
    /// A fault report without enough context to start
    ClarificationNeeded { prompt: String, missing: Vec<String> },
    /// Unrelated to network operations
    Rejected,
    AwaitingApproval { task_ids: Vec<String> },
    Completed(DiagnosisReport),
}

/// Result of `resume_diagnosis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResumeOutcome {
    AwaitingApproval { task_ids: Vec<String> },
    Completed(DiagnosisReport),
}

impl From<ResumeOutcome> for StartOutcome {
    fn from(outcome: ResumeOutcome) -> Self {
        match outcome {
            ResumeOutcome::AwaitingApproval { task_ids } => StartOutcome::AwaitingApproval { task_ids },
            ResumeOutcome::Completed(report) => StartOutcome::Completed(report),
        }
    }
}

/// Stored session as seen by `session_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    pub session_id: String,
    pub status: SessionStatus,
    pub phase: DiagnosisPhase,
    pub round: u32,
    pub max_rounds: u32,
    /// Tasks waiting on a human decision
    pub pending_task_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionCheckpoint> for SessionOverview {
    fn from(checkpoint: &SessionCheckpoint) -> Self {
        Self {
            session_id: checkpoint.session_id.clone(),
            status: checkpoint.status,
            phase: checkpoint.state.phase,
            round: checkpoint.state.round,
            max_rounds: checkpoint.state.max_rounds,
            pending_task_ids: checkpoint
                .state
                .pending
                .as_ref()
                .map(|p| p.gated_task_ids())
                .unwrap_or_default(),
            created_at: checkpoint.created_at,
            updated_at: checkpoint.updated_at,
        }
    }
}

/// Session API of the diagnostic engine.
pub struct DiagnosisService {
    guard: Guard,
    supervisor: Supervisor,
    store: Arc<dyn CheckpointStore>,
    /// Shutdown switch; cancels every current and future run
    cancellation_token: CancellationToken,
    /// Parent of the runs in flight, replaced by `cancel_running`
    runs: Mutex<CancellationToken>,
}

impl DiagnosisService {
    pub fn new(guard: Guard, supervisor: Supervisor, store: Arc<dyn CheckpointStore>) -> Self {
        let cancellation_token = CancellationToken::new();
        Self {
            guard,
            supervisor,
            store,
            runs: Mutex::new(cancellation_token.child_token()),
            cancellation_token,
        }
    }

    /// Assemble a service from settings. The LLM classifier is used when
    /// `settings.llm` is set, the rule-based classifier otherwise.
    pub fn from_settings(
        settings: &DiagnosisSettings,
        historical_tool: Arc<dyn TelemetryQuery>,
        realtime_tool: Arc<dyn TelemetryQuery>,
        store: Arc<dyn CheckpointStore>,
    ) -> AppResult<Self> {
        settings.validate().map_err(AppError::validation)?;
        let config = settings.to_config()?;

        let classifier: Arc<dyn StructuredClassifier> = match &settings.llm {
            Some(provider_config) => {
                let provider = OpenAICompatibleProvider::new(provider_config.clone())
                    .map_err(|e| AppError::config(e.to_string()))?;
                // Leave room for the repair attempt inside the Guard timeout.
                let attempt_timeout = config.classifier_timeout / 2;
                Arc::new(
                    LlmFaultClassifier::new(Arc::new(provider))
                        .with_attempt_timeout(attempt_timeout.max(Duration::from_millis(1))),
                )
            }
            None => Arc::new(RuleBasedClassifier::new()),
        };
        let guard = Guard::new(classifier, &config);

        let historical = Arc::new(HistoricalWorker::new(historical_tool, config.max_tool_calls));
        let realtime = Arc::new(RealtimeWorker::new(realtime_tool, config.max_tool_calls));
        let mut supervisor = Supervisor::new(config, historical, realtime)?;
        if settings.require_realtime_approval {
            supervisor = supervisor.with_approval_policy(Arc::new(RealtimeRequiresApproval));
        }

        Ok(Self::new(guard, supervisor, store))
    }

    /// Open the SQLite store named by the settings, or the default one.
    pub fn open_store(settings: &DiagnosisSettings) -> AppResult<Arc<dyn CheckpointStore>> {
        let store = match &settings.database_path {
            Some(path) => SqliteCheckpointStore::open(path)?,
            None => SqliteCheckpointStore::open_default()?,
        };
        Ok(Arc::new(store))
    }

    /// Use an externally owned token as the shutdown switch.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.runs = Mutex::new(token.child_token());
        self.cancellation_token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Cancel the runs currently in flight. Later runs are unaffected.
    pub fn cancel_running(&self) -> AppResult<()> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| AppError::invalid_state("run token lock poisoned"))?;
        runs.cancel();
        *runs = self.cancellation_token.child_token();
        Ok(())
    }

    /// Token for one supervisor run.
    fn run_token(&self) -> AppResult<CancellationToken> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| AppError::invalid_state("run token lock poisoned"))?;
        Ok(runs.child_token())
    }

    /// Classify a request and, if it is a sufficient fault report, diagnose it.
    ///
    /// `device_scope` replaces the devices extracted from the text when the
    /// caller already knows the forwarding path.
    pub async fn start_diagnosis(
        &self,
        user_text: &str,
        device_scope: Option<Vec<String>>,
    ) -> AppResult<DiagnosisStart> {
        let session_id = Uuid::new_v4().to_string();
        let decision = self.guard.check(user_text).await;

        let context = match decision.query_type {
            QueryType::SimpleQuery | QueryType::ConfigChange => {
                let mode = decision
                    .redirect_mode
                    .unwrap_or_else(|| STANDARD_REDIRECT.to_string());
                return Ok(DiagnosisStart {
                    session_id,
                    outcome: StartOutcome::Redirected { mode },
                });
            }
            QueryType::OffTopic => {
                return Ok(DiagnosisStart {
                    session_id,
                    outcome: StartOutcome::Rejected,
                });
            }
            QueryType::FaultDiagnosis if !decision.is_sufficient => {
                return Ok(DiagnosisStart {
                    session_id,
                    outcome: StartOutcome::ClarificationNeeded {
                        prompt: decision.clarification_prompt.unwrap_or_default(),
                        missing: decision.missing_info,
                    },
                });
            }
            QueryType::FaultDiagnosis => decision
                .context
                .ok_or_else(|| AppError::invalid_state("fault decision without context"))?,
        };

        let mut state = self.supervisor.init_state(&session_id, &context, device_scope)?;
        let cancel = self.run_token()?;
        info!(
            session_id = %session_id,
            devices = ?state.device_scope,
            degraded = decision.degraded,
            "Diagnosis session started"
        );
        let outcome = self
            .supervisor
            .run(&mut state, &context, &cancel)
            .await?;
        let outcome = self.settle(context, state, outcome, None)?;

        Ok(DiagnosisStart {
            session_id,
            outcome: outcome.into(),
        })
    }

    /// Continue a session that is waiting on approval.
    pub async fn resume_diagnosis(
        &self,
        session_id: &str,
        decision: ApprovalDecision,
    ) -> AppResult<ResumeOutcome> {
        if !self
            .store
            .claim(session_id, SessionStatus::AwaitingApproval, SessionStatus::Running)?
        {
            let checkpoint = self.load(session_id)?;
            return Err(AppError::invalid_state(format!(
                "session {} is {}, not awaiting approval",
                session_id, checkpoint.status
            )));
        }

        match self.drive_claimed(session_id, decision).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Hand the session back so it can be resumed again.
                warn!(session_id = %session_id, error = %e, "Resume failed; releasing session");
                self.store
                    .claim(session_id, SessionStatus::Running, SessionStatus::AwaitingApproval)?;
                Err(e)
            }
        }
    }

    /// Drive a session this service has claimed.
    async fn drive_claimed(
        &self,
        session_id: &str,
        decision: ApprovalDecision,
    ) -> AppResult<ResumeOutcome> {
        let SessionCheckpoint {
            context,
            mut state,
            created_at,
            ..
        } = self.load(session_id)?;
        let cancel = self.run_token()?;
        let outcome = self
            .supervisor
            .resume(&mut state, &context, decision, &cancel)
            .await?;
        self.settle(context, state, outcome, Some(created_at))
    }

    /// Stored report of a completed session.
    pub fn get_report(&self, session_id: &str) -> AppResult<DiagnosisReport> {
        let checkpoint = self.load(session_id)?;
        match (checkpoint.status, checkpoint.report) {
            (SessionStatus::Completed, Some(report)) => Ok(report),
            (SessionStatus::Completed, None) => Err(AppError::invalid_state(format!(
                "session {} completed without a report",
                session_id
            ))),
            (status, _) => Err(AppError::invalid_state(format!(
                "session {} is {}",
                session_id, status
            ))),
        }
    }

    pub fn session_status(&self, session_id: &str) -> AppResult<SessionOverview> {
        Ok(SessionOverview::from(&self.load(session_id)?))
    }

    fn load(&self, session_id: &str) -> AppResult<SessionCheckpoint> {
        self.store
            .load(session_id)?
            .ok_or_else(|| AppError::not_found(format!("session {}", session_id)))
    }

    /// Persist the outcome of a supervisor run.
    fn settle(
        &self,
        context: DiagnosisContext,
        mut state: SupervisorState,
        outcome: SupervisorOutcome,
        created_at: Option<DateTime<Utc>>,
    ) -> AppResult<ResumeOutcome> {
        let session_id = state.session_id.clone();
        let (checkpoint, outcome) = match outcome {
            SupervisorOutcome::AwaitingApproval { task_ids } => (
                SessionCheckpoint::awaiting(context, state),
                ResumeOutcome::AwaitingApproval { task_ids },
            ),
            SupervisorOutcome::Finished => {
                let report = ReportSynthesizer::synthesize(&state, &context);
                state.phase = DiagnosisPhase::Done;
                info!(
                    session_id = %session_id,
                    round = state.round,
                    complete = report.complete,
                    confidence = report.confidence,
                    "Diagnosis session completed"
                );
                (
                    SessionCheckpoint::completed(context, state, report.clone()),
                    ResumeOutcome::Completed(report),
                )
            }
        };
        let checkpoint = match created_at {
            Some(created_at) => checkpoint.with_created_at(created_at),
            None => checkpoint,
        };
        self.store.save(&checkpoint)?;
        Ok(outcome)
    }
}
