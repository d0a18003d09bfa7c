//! Guard
//!
//! Entry gate of the diagnostic engine. A single classifier call decides
//! whether a request is a fault report, a request for the standard flow, or
//! off topic, and whether a fault report carries enough context to start a
//! session. Whatever the classifier returns is normalized here so that
//! downstream code can rely on the decision invariants.

pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use netdiag_core::{
    ClassificationFailurePolicy, DiagnosisConfig, DiagnosisContext, GuardDecision, QueryType,
    StructuredClassifier, MISSING_DEVICE, MISSING_SYMPTOM,
};

pub use rules::RuleBasedClassifier;

/// `missing_info` entry used by the fail-closed policy.
pub const MISSING_CLASSIFICATION: &str = "classification";

/// Classifies incoming requests and gates the diagnosis flow.
pub struct Guard {
    classifier: Arc<dyn StructuredClassifier>,
    timeout: Duration,
    policy: ClassificationFailurePolicy,
}

impl Guard {
    pub fn new(classifier: Arc<dyn StructuredClassifier>, config: &DiagnosisConfig) -> Self {
        Self {
            classifier,
            timeout: config.classifier_timeout,
            policy: config.failure_policy,
        }
    }

    /// Name of the classifier backend.
    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Classify `user_text`. Never fails: classifier errors, timeouts and
    /// malformed answers are resolved by the failure policy.
    pub async fn check(&self, user_text: &str) -> GuardDecision {
        let text = user_text.trim();
        if text.is_empty() {
            return GuardDecision::off_topic();
        }

        let outcome = tokio::time::timeout(self.timeout, self.classifier.classify(text)).await;
        let failure = match outcome {
            Ok(Ok(raw)) => match Self::normalize(raw, text) {
                Ok(decision) => {
                    debug!(
                        classifier = self.classifier.name(),
                        query_type = %decision.query_type,
                        sufficient = decision.is_sufficient,
                        "Guard decision"
                    );
                    return decision;
                }
                Err(reason) => reason,
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("classifier timed out after {}ms", self.timeout.as_millis()),
        };
        self.on_failure(text, &failure)
    }

    /// Enforce decision invariants on a raw classifier answer.
    fn normalize(raw: GuardDecision, text: &str) -> Result<GuardDecision, String> {
        if raw.is_fault_diagnosis != (raw.query_type == QueryType::FaultDiagnosis) {
            return Err(format!(
                "inconsistent classifier answer: queryType={} isFaultDiagnosis={}",
                raw.query_type, raw.is_fault_diagnosis
            ));
        }

        let decision = match raw.query_type {
            QueryType::SimpleQuery | QueryType::ConfigChange => GuardDecision::redirect(raw.query_type),
            QueryType::OffTopic => GuardDecision::off_topic(),
            QueryType::FaultDiagnosis => {
                let context = raw
                    .context
                    .unwrap_or_else(|| DiagnosisContext::new(text))
                    .normalized();
                let mut decision = GuardDecision::fault(context);
                if !decision.is_sufficient {
                    decision.missing_info = Self::missing_info(decision.context.as_ref());
                    decision.clarification_prompt = raw
                        .clarification_prompt
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .or_else(|| Some(Self::clarification_prompt(&decision.missing_info)));
                }
                decision
            }
        };
        Ok(decision)
    }

    fn missing_info(context: Option<&DiagnosisContext>) -> Vec<String> {
        let mut missing = Vec::new();
        if !context.is_some_and(|c| c.has_device()) {
            missing.push(MISSING_DEVICE.to_string());
        }
        if !context.is_some_and(|c| !c.symptom.trim().is_empty()) {
            missing.push(MISSING_SYMPTOM.to_string());
        }
        missing
    }

    fn clarification_prompt(missing: &[String]) -> String {
        let mut lines = Vec::new();
        if missing.iter().any(|m| m == MISSING_DEVICE) {
            lines.push(
                "Which device shows the problem? Give a hostname or IP address (for example R3), \
                 and the destination it cannot reach if there is one.",
            );
        }
        if missing.iter().any(|m| m == MISSING_SYMPTOM) {
            lines.push("What exactly is going wrong (unreachable, packet loss, slow, flapping)?");
        }
        if missing.iter().any(|m| m == MISSING_CLASSIFICATION) {
            lines.push(
                "The request could not be understood. Please restate the problem and name the \
                 affected devices by hostname or IP address.",
            );
        }
        lines.join(" ")
    }

    fn on_failure(&self, text: &str, reason: &str) -> GuardDecision {
        warn!(
            classifier = self.classifier.name(),
            policy = ?self.policy,
            reason,
            "Classification failed, applying failure policy"
        );
        let mut decision = GuardDecision::fault(DiagnosisContext::new(text));
        decision.degraded = true;
        match self.policy {
            ClassificationFailurePolicy::FailOpen => {
                decision.is_sufficient = true;
            }
            ClassificationFailurePolicy::FailClosed => {
                decision.is_sufficient = false;
                decision.missing_info = vec![MISSING_CLASSIFICATION.to_string()];
                decision.clarification_prompt =
                    Some(Self::clarification_prompt(&decision.missing_info));
            }
        }
        decision
    }
}
