//! Checkpoint Models
//!
//! Everything needed to pick a diagnosis session up again in another process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdiag_core::{DiagnosisContext, DiagnosisReport, SupervisorState};

/// Lifecycle status of a stored session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Suspended until a human approves or rejects the pending batch
    AwaitingApproval,
    /// Claimed by a resume that is driving the session
    Running,
    /// Report produced; the session is done
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::AwaitingApproval => "awaiting_approval",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted snapshot of one diagnosis session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCheckpoint {
    pub session_id: String,
    pub status: SessionStatus,
    pub context: DiagnosisContext,
    pub state: SupervisorState,
    /// Present once `status == Completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<DiagnosisReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionCheckpoint {
    /// Create a checkpoint for a session that is waiting on approval.
    pub fn awaiting(context: DiagnosisContext, state: SupervisorState) -> Self {
        let now = Utc::now();
        Self {
            session_id: state.session_id.clone(),
            status: SessionStatus::AwaitingApproval,
            context,
            state,
            report: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a checkpoint for a finished session.
    pub fn completed(context: DiagnosisContext, state: SupervisorState, report: DiagnosisReport) -> Self {
        let mut checkpoint = Self::awaiting(context, state);
        checkpoint.status = SessionStatus::Completed;
        checkpoint.report = Some(report);
        checkpoint
    }

    /// Keep the original creation time of an earlier snapshot.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awaiting_checkpoint_has_no_report() {
        let state = SupervisorState::new("s1", 5, vec!["R1".into()]);
        let checkpoint = SessionCheckpoint::awaiting(DiagnosisContext::new("down"), state);
        assert_eq!(checkpoint.session_id, "s1");
        assert_eq!(checkpoint.status, SessionStatus::AwaitingApproval);
        assert!(checkpoint.report.is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
        assert_eq!(SessionStatus::Completed.to_string(), "completed");
        assert_eq!(serde_json::to_string(&SessionStatus::Running).unwrap(), "\"running\"");
    }
}
