//! Guard Decisions
//!
//! The output of the entry Guard. A decision either redirects the request to
//! the standard (non-diagnostic) flow, rejects it, asks for clarification, or
//! carries a `DiagnosisContext` that a session can start from.

use serde::{Deserialize, Serialize};

use crate::context::DiagnosisContext;

/// Redirect mode used for requests that belong to the standard flow.
pub const STANDARD_REDIRECT: &str = "standard";

/// `missing_info` entry used when no device identifier was given.
pub const MISSING_DEVICE: &str = "source_device_or_target";

/// `missing_info` entry used when the symptom is empty.
pub const MISSING_SYMPTOM: &str = "symptom";

/// Intent of the user's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// A described malfunction or symptom
    FaultDiagnosis,
    /// A state lookup ("show interface status")
    SimpleQuery,
    /// A configuration change request
    ConfigChange,
    /// Unrelated to network operations
    OffTopic,
}

impl QueryType {
    /// Whether this query type is handed over to the standard flow.
    pub fn redirects(&self) -> bool {
        matches!(self, QueryType::SimpleQuery | QueryType::ConfigChange)
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryType::FaultDiagnosis => "fault_diagnosis",
            QueryType::SimpleQuery => "simple_query",
            QueryType::ConfigChange => "config_change",
            QueryType::OffTopic => "off_topic",
        };
        write!(f, "{}", s)
    }
}

/// Output of the Guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardDecision {
    pub query_type: QueryType,
    pub is_fault_diagnosis: bool,
    /// Only meaningful when `query_type == FaultDiagnosis`
    pub is_sufficient: bool,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DiagnosisContext>,
    /// Set only for `SimpleQuery` / `ConfigChange`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_mode: Option<String>,
    /// True when the decision came from the classification-failure policy
    /// instead of the classifier.
    #[serde(default)]
    pub degraded: bool,
}

impl GuardDecision {
    /// A fault-diagnosis decision whose sufficiency is derived from the context.
    pub fn fault(context: DiagnosisContext) -> Self {
        Self {
            query_type: QueryType::FaultDiagnosis,
            is_fault_diagnosis: true,
            is_sufficient: context.is_sufficient(),
            missing_info: Vec::new(),
            clarification_prompt: None,
            context: Some(context),
            redirect_mode: None,
            degraded: false,
        }
    }

    /// A decision that hands the request to the standard flow.
    pub fn redirect(query_type: QueryType) -> Self {
        Self {
            query_type,
            is_fault_diagnosis: false,
            is_sufficient: false,
            missing_info: Vec::new(),
            clarification_prompt: None,
            context: None,
            redirect_mode: Some(STANDARD_REDIRECT.to_string()),
            degraded: false,
        }
    }

    /// An off-topic rejection.
    pub fn off_topic() -> Self {
        Self {
            query_type: QueryType::OffTopic,
            is_fault_diagnosis: false,
            is_sufficient: false,
            missing_info: Vec::new(),
            clarification_prompt: None,
            context: None,
            redirect_mode: None,
            degraded: false,
        }
    }

    /// Whether a diagnosis session can start from this decision.
    pub fn can_diagnose(&self) -> bool {
        self.query_type == QueryType::FaultDiagnosis && self.is_sufficient && self.context.is_some()
    }

    /// Whether the user must be asked for more information.
    pub fn needs_clarification(&self) -> bool {
        self.query_type == QueryType::FaultDiagnosis && !self.is_sufficient
    }
}
