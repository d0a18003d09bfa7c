//! Supervisor
//!
//! Drives one diagnosis session through its rounds:
//!
//! 1. Scoping (once) - prior findings from the knowledge base and syslog
//!    narrow the candidate layers
//! 2. Assign - one historical task per candidate layer still below the
//!    sufficiency threshold
//! 3. Execute - approval gate, then concurrent workers under a semaphore
//!    with a per-worker timeout
//! 4. Integrate - results are merged L1 → L4 regardless of completion order;
//!    the first qualifying candidate becomes the hypothesis
//! 5. Decide - historical hypotheses are verified by a realtime task; an
//!    unconfirmed round either starts the next round or ends the session
//!
//! A gated task that has no decision yet suspends the session. The batch is
//! kept in `SupervisorState::pending` and re-entered by `resume`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netdiag_core::{
    ApprovalDecision, ApprovalGate, ApprovalPolicy, ApprovalStatus, CoreError, CoreResult,
    DiagnosisConfig, DiagnosisContext, DiagnosisPhase, DiagnosisResult, DiagnosisTask,
    EmptyKnowledgeBase, EmptySyslog, EvidenceSource, IncompleteReason, KnowledgeBase, Layer,
    NeverRequireApproval, PendingApproval, PendingApprovalGate, PriorFinding, RootCauseHypothesis,
    SupervisorState, SyslogSearch, TimeWindow,
};

use super::worker::InvestigationWorker;

/// Where a supervisor run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Suspended until the listed tasks are approved or rejected
    AwaitingApproval { task_ids: Vec<String> },
    /// The state reached `Reporting` and is ready for the synthesizer
    Finished,
}

enum ExecuteOutcome {
    Results(Vec<DiagnosisResult>),
    Suspended(Vec<String>),
    /// Stopped early; `partial` holds the results that completed in time
    Interrupted {
        reason: IncompleteReason,
        partial: Vec<DiagnosisResult>,
    },
}

/// Wall-clock time spent in the loop, including earlier runs of the session.
struct Clock {
    base_ms: u64,
    started: Instant,
}

impl Clock {
    fn start(state: &SupervisorState) -> Self {
        Self {
            base_ms: state.elapsed_ms,
            started: Instant::now(),
        }
    }

    fn total_ms(&self) -> u64 {
        self.base_ms
            .saturating_add(u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX))
    }
}

/// Diagnosis loop orchestrator.
pub struct Supervisor {
    config: DiagnosisConfig,
    historical: Arc<dyn InvestigationWorker>,
    realtime: Arc<dyn InvestigationWorker>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    syslog: Arc<dyn SyslogSearch>,
    approval_gate: Arc<dyn ApprovalGate>,
    approval_policy: Arc<dyn ApprovalPolicy>,
}

impl Supervisor {
    /// Create a supervisor with empty scoping backends, a gate that always
    /// answers `Pending` and a policy that never gates.
    pub fn new(
        config: DiagnosisConfig,
        historical: Arc<dyn InvestigationWorker>,
        realtime: Arc<dyn InvestigationWorker>,
    ) -> CoreResult<Self> {
        if config.max_rounds == 0 {
            return Err(CoreError::invalid_configuration("max_rounds must be at least 1"));
        }
        if config.max_concurrent_workers == 0 {
            return Err(CoreError::invalid_configuration(
                "max_concurrent_workers must be at least 1",
            ));
        }
        if historical.source() != EvidenceSource::Historical {
            return Err(CoreError::invalid_configuration(
                "historical worker must produce historical evidence",
            ));
        }
        if realtime.source() != EvidenceSource::Realtime {
            return Err(CoreError::invalid_configuration(
                "realtime worker must produce realtime evidence",
            ));
        }
        Ok(Self {
            config,
            historical,
            realtime,
            knowledge_base: Arc::new(EmptyKnowledgeBase),
            syslog: Arc::new(EmptySyslog),
            approval_gate: Arc::new(PendingApprovalGate),
            approval_policy: Arc::new(NeverRequireApproval),
        })
    }

    pub fn with_knowledge_base(mut self, knowledge_base: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge_base = knowledge_base;
        self
    }

    pub fn with_syslog(mut self, syslog: Arc<dyn SyslogSearch>) -> Self {
        self.syslog = syslog;
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval_gate = gate;
        self
    }

    pub fn with_approval_policy(mut self, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.approval_policy = policy;
        self
    }

    pub fn config(&self) -> &DiagnosisConfig {
        &self.config
    }

    /// Fresh state for a session. `path_devices` overrides the devices named
    /// in the context when the caller already knows the forwarding path.
    pub fn init_state(
        &self,
        session_id: &str,
        context: &DiagnosisContext,
        path_devices: Option<Vec<String>>,
    ) -> CoreResult<SupervisorState> {
        context.validate()?;
        let mut scope: Vec<String> = Vec::new();
        for device in path_devices.unwrap_or_default() {
            let device = device.trim().to_string();
            if !device.is_empty() && !scope.contains(&device) {
                scope.push(device);
            }
        }
        if scope.is_empty() {
            scope = context.devices();
        }
        Ok(SupervisorState::new(session_id, self.config.max_rounds, scope))
    }

    /// Run a session from its current phase until it finishes or suspends.
    pub async fn run(
        &self,
        state: &mut SupervisorState,
        context: &DiagnosisContext,
        cancel: &CancellationToken,
    ) -> CoreResult<SupervisorOutcome> {
        if state.awaiting_approval {
            return Err(CoreError::validation(format!(
                "session {} is awaiting approval; use resume",
                state.session_id
            )));
        }
        self.drive(state, context, cancel, None).await
    }

    /// Continue a suspended session with a human decision on its pending batch.
    pub async fn resume(
        &self,
        state: &mut SupervisorState,
        context: &DiagnosisContext,
        decision: ApprovalDecision,
        cancel: &CancellationToken,
    ) -> CoreResult<SupervisorOutcome> {
        if !state.awaiting_approval || state.pending.is_none() {
            return Err(CoreError::validation(format!(
                "session {} is not awaiting approval",
                state.session_id
            )));
        }
        info!(session_id = %state.session_id, decision = ?decision, "Resuming session");
        state.awaiting_approval = false;
        self.drive(state, context, cancel, Some(decision)).await
    }

    async fn drive(
        &self,
        state: &mut SupervisorState,
        context: &DiagnosisContext,
        cancel: &CancellationToken,
        mut decision: Option<ApprovalDecision>,
    ) -> CoreResult<SupervisorOutcome> {
        let clock = Clock::start(state);
        let outcome = self.drive_inner(state, context, cancel, &mut decision, &clock).await;
        state.elapsed_ms = clock.total_ms();
        outcome
    }

    async fn drive_inner(
        &self,
        state: &mut SupervisorState,
        context: &DiagnosisContext,
        cancel: &CancellationToken,
        decision: &mut Option<ApprovalDecision>,
        clock: &Clock,
    ) -> CoreResult<SupervisorOutcome> {
        loop {
            if matches!(state.phase, DiagnosisPhase::Reporting | DiagnosisPhase::Done) {
                return Ok(SupervisorOutcome::Finished);
            }
            if let Some(reason) = self.interruption(cancel, clock) {
                Self::finish_incomplete(state, reason);
                continue;
            }

            match state.phase {
                DiagnosisPhase::Scoping => self.scope(state, context).await,
                DiagnosisPhase::Diagnosing => {
                    let tasks = match state.pending.take() {
                        Some(pending) => pending.tasks,
                        None => self.assign(state, context),
                    };
                    if tasks.is_empty() {
                        info!(session_id = %state.session_id, round = state.round, "No layer left to investigate");
                        Self::finish_incomplete(state, IncompleteReason::NoCandidateLayers);
                        continue;
                    }
                    match self.execute(state, tasks, decision.take(), cancel, clock).await {
                        ExecuteOutcome::Results(results) => {
                            self.integrate(state, results);
                            self.decide(state);
                        }
                        ExecuteOutcome::Suspended(task_ids) => {
                            return Ok(SupervisorOutcome::AwaitingApproval { task_ids });
                        }
                        ExecuteOutcome::Interrupted { reason, partial } => {
                            self.integrate(state, partial);
                            Self::finish_incomplete(state, reason);
                        }
                    }
                }
                DiagnosisPhase::Verifying => {
                    let tasks = match state.pending.take() {
                        Some(pending) => pending.tasks,
                        None => match self.verification_task(state) {
                            Some(task) => vec![task],
                            None => {
                                // Nothing to verify; fall back to the next round.
                                state.phase = DiagnosisPhase::Diagnosing;
                                self.advance_round(state);
                                continue;
                            }
                        },
                    };
                    match self.execute(state, tasks, decision.take(), cancel, clock).await {
                        ExecuteOutcome::Results(results) => self.verify(state, results),
                        ExecuteOutcome::Suspended(task_ids) => {
                            return Ok(SupervisorOutcome::AwaitingApproval { task_ids });
                        }
                        ExecuteOutcome::Interrupted { reason, partial } => {
                            for result in partial {
                                state.integrate(&result.clamped());
                            }
                            Self::finish_incomplete(state, reason);
                        }
                    }
                }
                DiagnosisPhase::Reporting | DiagnosisPhase::Done => {}
            }
        }
    }

    // ========================================================================
    // Scoping
    // ========================================================================

    async fn scope(&self, state: &mut SupervisorState, context: &DiagnosisContext) {
        let window = TimeWindow::last_minutes(self.config.syslog_window_minutes);
        let (kb, syslog) = tokio::join!(
            self.knowledge_base.search(&context.symptom),
            self.syslog.search(&state.device_scope, &window),
        );

        let mut priors: Vec<PriorFinding> = Vec::new();
        match kb {
            Ok(found) => priors.extend(found),
            Err(e) => warn!(session_id = %state.session_id, error = %e, "Knowledge base search failed"),
        }
        match syslog {
            Ok(found) => priors.extend(found),
            Err(e) => warn!(session_id = %state.session_id, error = %e, "Syslog search failed"),
        }

        let mut named: Vec<Layer> = Vec::new();
        for prior in priors {
            match prior.layer {
                Some(layer) => {
                    let status = state.layer_mut(layer);
                    status.merge_confidence(prior.capped_confidence());
                    status.findings.push(prior.summary);
                    named.push(layer);
                }
                None => state.scoping_notes.push(prior.summary),
            }
        }
        if let Some(hint) = context.layer_hint {
            named.push(hint);
        }
        named.sort();
        named.dedup();
        if !named.is_empty() {
            state.candidate_layers = named;
        }

        info!(
            session_id = %state.session_id,
            candidates = ?state.candidate_layers,
            notes = state.scoping_notes.len(),
            "Scoping complete"
        );
        state.phase = DiagnosisPhase::Diagnosing;
    }

    // ========================================================================
    // Assign / Execute
    // ========================================================================

    fn assign(&self, state: &SupervisorState, context: &DiagnosisContext) -> Vec<DiagnosisTask> {
        state
            .candidate_layers
            .iter()
            .filter(|layer| state.layer_confidence(**layer) < self.config.sufficient_confidence)
            .filter(|layer| !state.contradicted_layers.contains(layer))
            .map(|layer| {
                let description = format!(
                    "Investigate {} ({}) for: {}",
                    layer,
                    layer.description(),
                    context.symptom
                );
                self.gated(DiagnosisTask::new(
                    &state.session_id,
                    state.round,
                    *layer,
                    EvidenceSource::Historical,
                    description,
                    &state.device_scope,
                ))
            })
            .collect()
    }

    fn verification_task(&self, state: &SupervisorState) -> Option<DiagnosisTask> {
        let hypothesis = state.hypothesis.as_ref()?;
        let description = format!(
            "Verify {} hypothesis with live data: {}",
            hypothesis.layer, hypothesis.description
        );
        Some(self.gated(DiagnosisTask::new(
            &state.session_id,
            state.round,
            hypothesis.layer,
            EvidenceSource::Realtime,
            description,
            &state.device_scope,
        )))
    }

    fn gated(&self, task: DiagnosisTask) -> DiagnosisTask {
        let required = self.approval_policy.requires_approval(&task);
        task.with_approval_required(required)
    }

    fn worker_for(&self, source: EvidenceSource) -> &Arc<dyn InvestigationWorker> {
        match source {
            EvidenceSource::Historical => &self.historical,
            EvidenceSource::Realtime => &self.realtime,
        }
    }

    async fn execute(
        &self,
        state: &mut SupervisorState,
        tasks: Vec<DiagnosisTask>,
        decision: Option<ApprovalDecision>,
        cancel: &CancellationToken,
        clock: &Clock,
    ) -> ExecuteOutcome {
        let mut results = Vec::with_capacity(tasks.len());
        let mut runnable = Vec::with_capacity(tasks.len());
        let mut waiting = false;

        for task in &tasks {
            if !task.requires_approval {
                runnable.push(task.clone());
                continue;
            }
            let status = match decision {
                Some(decision) => ApprovalStatus::from(decision),
                None => self.approval_gate.status(&task.id).await,
            };
            match status {
                ApprovalStatus::Approved => runnable.push(task.clone()),
                ApprovalStatus::Rejected => {
                    info!(session_id = %state.session_id, task_id = %task.id, "Task rejected by approver");
                    results.push(DiagnosisResult::approval_rejected(task));
                }
                ApprovalStatus::Pending => waiting = true,
            }
        }

        if waiting {
            let pending = PendingApproval {
                phase: state.phase,
                tasks,
            };
            let task_ids = pending.gated_task_ids();
            info!(
                session_id = %state.session_id,
                round = state.round,
                tasks = ?task_ids,
                "Suspending for approval"
            );
            state.pending = Some(pending);
            state.awaiting_approval = true;
            return ExecuteOutcome::Suspended(task_ids);
        }

        debug!(session_id = %state.session_id, round = state.round, tasks = runnable.len(), "Dispatching workers");
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_workers));
        let worker_timeout = self.config.worker_timeout;
        let mut runs: FuturesUnordered<_> = runnable
            .into_iter()
            .map(|task| {
                let semaphore = semaphore.clone();
                let worker = self.worker_for(task.source).clone();
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    match tokio::time::timeout(worker_timeout, worker.run(&task)).await {
                        // The task decides layer and source, and so the cap.
                        Ok(mut result) => {
                            result.layer = task.layer;
                            result.source = task.source;
                            result.clamped()
                        }
                        Err(_) => {
                            warn!(task_id = %task.id, timeout_ms = worker_timeout.as_millis() as u64, "Worker timed out");
                            DiagnosisResult::timed_out(&task, worker_timeout.as_millis() as u64)
                        }
                    }
                }
            })
            .collect();

        let remaining = self
            .config
            .session_budget()
            .saturating_sub(Duration::from_millis(clock.total_ms()));
        let deadline = tokio::time::sleep(remaining);
        tokio::pin!(deadline);

        // Results are kept as they arrive so an interruption still reports them.
        let interrupted = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Some(IncompleteReason::Cancelled),
                _ = &mut deadline => break Some(IncompleteReason::SessionTimeout),
                next = runs.next() => match next {
                    Some(result) => results.push(result),
                    None => break None,
                },
            }
        };
        match interrupted {
            None => ExecuteOutcome::Results(results),
            Some(reason) => {
                debug!(
                    session_id = %state.session_id,
                    completed = results.len(),
                    reason = ?reason,
                    "Keeping partial results"
                );
                ExecuteOutcome::Interrupted {
                    reason,
                    partial: results,
                }
            }
        }
    }

    // ========================================================================
    // Integrate / Decide
    // ========================================================================

    fn qualifies(&self, state: &SupervisorState, result: &DiagnosisResult) -> bool {
        let threshold = self.config.sufficient_confidence.min(result.source.cap());
        result.root_cause_candidate.is_some()
            && result.confidence >= threshold
            && !state.contradicted_layers.contains(&result.layer)
    }

    fn integrate(&self, state: &mut SupervisorState, mut results: Vec<DiagnosisResult>) {
        // Stable sort keeps the lowest layer first on ties.
        results.sort_by_key(|r| r.layer);
        for result in results {
            let result = result.clamped();
            state.integrate(&result);
            debug!(
                session_id = %state.session_id,
                round = state.round,
                layer = %result.layer,
                confidence = result.confidence,
                "Integrated result"
            );
            if state.hypothesis.is_none() && self.qualifies(state, &result) {
                if let Some(description) = result.root_cause_candidate.clone() {
                    info!(
                        session_id = %state.session_id,
                        layer = %result.layer,
                        confidence = result.confidence,
                        source = %result.source,
                        "Root-cause hypothesis"
                    );
                    state.set_hypothesis(RootCauseHypothesis {
                        layer: result.layer,
                        description,
                        device: result.device.clone(),
                        confidence: result.confidence,
                        source: result.source,
                    });
                }
            }
        }
    }

    fn decide(&self, state: &mut SupervisorState) {
        match state.hypothesis.as_ref().map(|h| h.needs_verification()) {
            Some(true) => state.phase = DiagnosisPhase::Verifying,
            Some(false) => state.phase = DiagnosisPhase::Reporting,
            None => self.advance_round(state),
        }
    }

    fn verify(&self, state: &mut SupervisorState, results: Vec<DiagnosisResult>) {
        let Some(hypothesis) = state.hypothesis.clone() else {
            self.advance_round(state);
            return;
        };
        let mut best: Option<DiagnosisResult> = None;
        for result in results {
            let result = result.clamped();
            state.integrate(&result);
            if best.as_ref().map_or(true, |b| result.confidence > b.confidence) {
                best = Some(result);
            }
        }

        match best {
            Some(result) if result.confidence >= hypothesis.confidence => {
                info!(
                    session_id = %state.session_id,
                    layer = %hypothesis.layer,
                    confidence = result.confidence,
                    "Hypothesis corroborated by realtime evidence"
                );
                state.set_hypothesis(RootCauseHypothesis {
                    layer: hypothesis.layer,
                    description: result.root_cause_candidate.unwrap_or(hypothesis.description),
                    device: result.device.or(hypothesis.device),
                    confidence: result.confidence,
                    source: EvidenceSource::Realtime,
                });
                state.phase = DiagnosisPhase::Reporting;
            }
            _ => {
                warn!(
                    session_id = %state.session_id,
                    layer = %hypothesis.layer,
                    "Hypothesis contradicted by realtime evidence"
                );
                state.clear_root_cause();
                state.phase = DiagnosisPhase::Diagnosing;
                self.advance_round(state);
            }
        }
    }

    /// Start the next round, or end the session when the budget is spent.
    fn advance_round(&self, state: &mut SupervisorState) {
        if !state.has_rounds_left() {
            info!(session_id = %state.session_id, round = state.round, "Round budget exhausted");
            Self::finish_incomplete(state, IncompleteReason::RoundBudgetExhausted);
            return;
        }
        state.round += 1;
        if state.candidate_layers.len() < Layer::ALL.len() {
            state.candidate_layers = Layer::ALL.to_vec();
        }
        state.phase = DiagnosisPhase::Diagnosing;
        info!(session_id = %state.session_id, round = state.round, "Round started");
    }

    fn interruption(&self, cancel: &CancellationToken, clock: &Clock) -> Option<IncompleteReason> {
        if cancel.is_cancelled() {
            return Some(IncompleteReason::Cancelled);
        }
        let budget_ms = u64::try_from(self.config.session_budget().as_millis()).unwrap_or(u64::MAX);
        if clock.total_ms() >= budget_ms {
            return Some(IncompleteReason::SessionTimeout);
        }
        None
    }

    fn finish_incomplete(state: &mut SupervisorState, reason: IncompleteReason) {
        if reason.is_interrupted() {
            warn!(session_id = %state.session_id, round = state.round, reason = ?reason, "Session interrupted");
        }
        state.terminated = true;
        state.incomplete_reason = Some(reason);
        state.pending = None;
        state.awaiting_approval = false;
        state.phase = DiagnosisPhase::Reporting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netdiag_core::{DiagnosisConfigBuilder, RealtimeRequiresApproval};

    type Behavior = Box<dyn Fn(&DiagnosisTask) -> DiagnosisResult + Send + Sync>;

    struct FnWorker {
        source: EvidenceSource,
        behavior: Behavior,
        delay: Duration,
        /// Only this layer is delayed; every layer when `None`
        slow_layer: Option<Layer>,
    }

    impl FnWorker {
        fn new(
            source: EvidenceSource,
            behavior: impl Fn(&DiagnosisTask) -> DiagnosisResult + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                source,
                behavior: Box::new(behavior),
                delay: Duration::ZERO,
                slow_layer: None,
            })
        }
    }

    #[async_trait]
    impl InvestigationWorker for FnWorker {
        fn source(&self) -> EvidenceSource {
            self.source
        }

        async fn run(&self, task: &DiagnosisTask) -> DiagnosisResult {
            if !self.delay.is_zero() && self.slow_layer.map_or(true, |l| l == task.layer) {
                tokio::time::sleep(self.delay).await;
            }
            (self.behavior)(task)
        }
    }

    fn flat(confidence: f64) -> impl Fn(&DiagnosisTask) -> DiagnosisResult + Send + Sync {
        move |task| DiagnosisResult::new(task.layer, task.source, vec![format!("{} checked", task.layer)], confidence)
    }

    fn config(max_rounds: u32) -> DiagnosisConfig {
        DiagnosisConfigBuilder::new().max_rounds(max_rounds).build().unwrap()
    }

    fn context() -> DiagnosisContext {
        DiagnosisContext::new("R3 cannot reach 10.0.100.100")
            .with_source("R3")
            .with_target("10.0.100.100")
    }

    async fn run_to_end(supervisor: &Supervisor) -> SupervisorState {
        let ctx = context();
        let mut state = supervisor.init_state("s", &ctx, None).unwrap();
        let outcome = supervisor.run(&mut state, &ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, SupervisorOutcome::Finished);
        state
    }

    #[test]
    fn test_rejects_mismatched_workers() {
        let h = FnWorker::new(EvidenceSource::Historical, flat(0.1));
        let err = Supervisor::new(config(3), h.clone(), h).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_init_state_scopes_to_context_devices() {
        let supervisor = Supervisor::new(
            config(3),
            FnWorker::new(EvidenceSource::Historical, flat(0.1)),
            FnWorker::new(EvidenceSource::Realtime, flat(0.1)),
        )
        .unwrap();
        let state = supervisor.init_state("s", &context(), None).unwrap();
        assert_eq!(state.device_scope, vec!["R3".to_string(), "10.0.100.100".to_string()]);
        let state = supervisor
            .init_state("s", &context(), Some(vec!["R3".into(), "R4".into(), "R3".into()]))
            .unwrap();
        assert_eq!(state.device_scope, vec!["R3".to_string(), "R4".to_string()]);
        assert!(supervisor.init_state("s", &DiagnosisContext::new(""), None).is_err());
    }

    #[tokio::test]
    async fn test_round_budget_exhausted() {
        let supervisor = Supervisor::new(
            config(3),
            FnWorker::new(EvidenceSource::Historical, flat(0.3)),
            FnWorker::new(EvidenceSource::Realtime, flat(0.3)),
        )
        .unwrap();
        let state = run_to_end(&supervisor).await;
        assert_eq!(state.round, 2);
        assert!(!state.root_cause_found);
        assert!(state.terminated);
        assert_eq!(state.incomplete_reason, Some(IncompleteReason::RoundBudgetExhausted));
        assert_eq!(state.investigation_order, Layer::ALL.to_vec());
        assert_eq!(state.max_confidence(), 0.3);
    }

    #[tokio::test]
    async fn test_lower_layer_wins_tie() {
        let historical = FnWorker::new(EvidenceSource::Historical, |task| {
            let result = DiagnosisResult::new(task.layer, task.source, vec!["suspicious".into()], 0.6);
            match task.layer {
                Layer::L2 | Layer::L4 => result.with_candidate(format!("{} fault", task.layer)),
                _ => result,
            }
        });
        let realtime = FnWorker::new(EvidenceSource::Realtime, |task| {
            DiagnosisResult::new(task.layer, task.source, vec!["confirmed".into()], 0.9)
        });
        let state = run_to_end(&Supervisor::new(config(5), historical, realtime).unwrap()).await;
        assert_eq!(state.root_cause_layer, Some(Layer::L2));
        let hypothesis = state.hypothesis.unwrap();
        assert_eq!(hypothesis.description, "L2 fault");
        assert_eq!(hypothesis.source, EvidenceSource::Realtime);
        assert_eq!(hypothesis.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_contradiction_clears_hypothesis_and_moves_on() {
        let historical = FnWorker::new(EvidenceSource::Historical, |task| {
            let result = DiagnosisResult::new(task.layer, task.source, vec!["loss".into()], 0.6);
            if task.layer == Layer::L3 {
                result.with_candidate("ACL drop")
            } else {
                result
            }
        });
        let realtime = FnWorker::new(EvidenceSource::Realtime, flat(0.1));
        let state = run_to_end(&Supervisor::new(config(2), historical, realtime).unwrap()).await;

        assert!(!state.root_cause_found);
        assert!(state.hypothesis.is_none());
        assert_eq!(state.contradicted_layers, vec![Layer::L3]);
        assert_eq!(state.layer_confidence(Layer::L3), 0.6);
        assert_eq!(state.round, 1);
        assert_eq!(state.incomplete_reason, Some(IncompleteReason::RoundBudgetExhausted));
    }

    #[tokio::test]
    async fn test_worker_timeout_yields_zero_confidence() {
        let slow = Arc::new(FnWorker {
            source: EvidenceSource::Historical,
            behavior: Box::new(flat(0.5)),
            delay: Duration::from_secs(5),
            slow_layer: None,
        });
        let config = DiagnosisConfigBuilder::new()
            .max_rounds(1)
            .worker_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let supervisor =
            Supervisor::new(config, slow, FnWorker::new(EvidenceSource::Realtime, flat(0.1))).unwrap();
        let state = run_to_end(&supervisor).await;
        assert_eq!(state.max_confidence(), 0.0);
        let findings = &state.layer(Layer::L1).unwrap().findings;
        assert!(findings[0].starts_with("timeout"));
    }

    #[tokio::test]
    async fn test_session_timeout_keeps_completed_results() {
        let historical = Arc::new(FnWorker {
            source: EvidenceSource::Historical,
            behavior: Box::new(flat(0.4)),
            delay: Duration::from_secs(2),
            slow_layer: Some(Layer::L4),
        });
        let config = DiagnosisConfigBuilder::new()
            .max_rounds(1)
            .per_round_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let supervisor =
            Supervisor::new(config, historical, FnWorker::new(EvidenceSource::Realtime, flat(0.1))).unwrap();
        let state = run_to_end(&supervisor).await;

        assert_eq!(state.incomplete_reason, Some(IncompleteReason::SessionTimeout));
        assert!(state.terminated);
        assert_eq!(state.investigation_order, vec![Layer::L1, Layer::L2, Layer::L3]);
        assert_eq!(state.max_confidence(), 0.4);
        assert!(!state.layer(Layer::L4).unwrap().investigated);
    }

    #[tokio::test]
    async fn test_task_source_overrides_worker_label() {
        // A historical task stays historical whatever the worker claims.
        let mislabelled = FnWorker::new(EvidenceSource::Historical, |task| {
            DiagnosisResult::new(task.layer, EvidenceSource::Realtime, vec!["link flaps".into()], 0.9)
                .with_candidate("bad cable")
        });
        let supervisor = Supervisor::new(
            config(1),
            mislabelled,
            FnWorker::new(EvidenceSource::Realtime, flat(0.1)),
        )
        .unwrap();
        let state = run_to_end(&supervisor).await;

        for layer in Layer::ALL {
            assert_eq!(state.layer_confidence(layer), 0.6);
        }
        assert!(!state.root_cause_confirmed());
        // The hypothesis went through verification and lost.
        assert_eq!(state.contradicted_layers, vec![Layer::L1]);
        assert_eq!(state.incomplete_reason, Some(IncompleteReason::RoundBudgetExhausted));
    }

    #[tokio::test]
    async fn test_layer_hint_narrows_then_widens() {
        let historical = FnWorker::new(EvidenceSource::Historical, flat(0.2));
        let supervisor =
            Supervisor::new(config(2), historical, FnWorker::new(EvidenceSource::Realtime, flat(0.1))).unwrap();
        let ctx = context().with_layer_hint(Layer::L2);
        let mut state = supervisor.init_state("s", &ctx, None).unwrap();
        supervisor.run(&mut state, &ctx, &CancellationToken::new()).await.unwrap();
        // Round 0 only touched L2; round 1 widened to every layer.
        assert_eq!(state.investigation_order[0], Layer::L2);
        assert_eq!(state.investigation_order.len(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_incomplete() {
        let supervisor = Supervisor::new(
            config(3),
            FnWorker::new(EvidenceSource::Historical, flat(0.3)),
            FnWorker::new(EvidenceSource::Realtime, flat(0.3)),
        )
        .unwrap();
        let ctx = context();
        let mut state = supervisor.init_state("s", &ctx, None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        supervisor.run(&mut state, &ctx, &cancel).await.unwrap();
        assert_eq!(state.incomplete_reason, Some(IncompleteReason::Cancelled));
        assert_eq!(state.phase, DiagnosisPhase::Reporting);
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let historical = FnWorker::new(EvidenceSource::Historical, |task| {
            let result = DiagnosisResult::new(task.layer, task.source, vec!["errors".into()], 0.6);
            if task.layer == Layer::L1 {
                result.with_candidate("bad optic").with_device("R3")
            } else {
                result
            }
        });
        let realtime = FnWorker::new(EvidenceSource::Realtime, |task| {
            DiagnosisResult::new(task.layer, task.source, vec!["rx power -30dBm".into()], 0.9)
        });
        let supervisor = Supervisor::new(config(3), historical, realtime)
            .unwrap()
            .with_approval_policy(Arc::new(RealtimeRequiresApproval));
        let ctx = context();
        let cancel = CancellationToken::new();
        let mut state = supervisor.init_state("s", &ctx, None).unwrap();

        let outcome = supervisor.run(&mut state, &ctx, &cancel).await.unwrap();
        assert_eq!(
            outcome,
            SupervisorOutcome::AwaitingApproval {
                task_ids: vec!["s:r0:L1:realtime".to_string()]
            }
        );
        assert!(state.awaiting_approval);
        assert_eq!(state.phase, DiagnosisPhase::Verifying);
        assert_eq!(state.round, 0);
        assert!(supervisor.run(&mut state, &ctx, &cancel).await.is_err());

        let outcome = supervisor
            .resume(&mut state, &ctx, ApprovalDecision::Approved, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, SupervisorOutcome::Finished);
        assert!(state.root_cause_confirmed());
        assert_eq!(state.hypothesis.as_ref().unwrap().device.as_deref(), Some("R3"));
        assert!(supervisor
            .resume(&mut state, &ctx, ApprovalDecision::Approved, &cancel)
            .await
            .is_err());
    }
}
