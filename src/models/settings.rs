//! Settings Models
//!
//! Diagnosis settings as stored in `~/.netdiag/config.json`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use netdiag_core::builders::{
    DEFAULT_CLASSIFIER_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_WORKERS, DEFAULT_MAX_ROUNDS,
    DEFAULT_MAX_TOOL_CALLS, DEFAULT_PER_ROUND_TIMEOUT_SECS, DEFAULT_SUFFICIENT_CONFIDENCE,
    DEFAULT_SYSLOG_WINDOW_MINUTES, DEFAULT_WORKER_TIMEOUT_SECS,
};
use netdiag_core::{ClassificationFailurePolicy, CoreResult, DiagnosisConfig, DiagnosisConfigBuilder};
use netdiag_llm::ProviderConfig;

/// Diagnosis configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisSettings {
    /// Round budget per session
    pub max_rounds: u32,
    /// Per-layer confidence at which a layer is no longer investigated
    pub sufficient_confidence: f64,
    /// Tool-call cap of one worker run
    pub max_tool_calls: u32,
    /// Worker pool size
    pub max_concurrent_workers: usize,
    pub worker_timeout_secs: u64,
    pub per_round_timeout_secs: u64,
    pub classifier_timeout_secs: u64,
    /// Look-back window of the round-0 syslog search
    pub syslog_window_minutes: u32,
    /// What the Guard does when classification fails
    #[serde(default)]
    pub failure_policy: ClassificationFailurePolicy,
    /// Hold realtime (live device) queries until a human approves them
    #[serde(default)]
    pub require_realtime_approval: bool,
    /// Checkpoint database; defaults to ~/.netdiag/sessions.db
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// LLM classifier backend; the rule-based classifier is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<ProviderConfig>,
}

impl Default for DiagnosisSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            sufficient_confidence: DEFAULT_SUFFICIENT_CONFIDENCE,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            worker_timeout_secs: DEFAULT_WORKER_TIMEOUT_SECS,
            per_round_timeout_secs: DEFAULT_PER_ROUND_TIMEOUT_SECS,
            classifier_timeout_secs: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            syslog_window_minutes: DEFAULT_SYSLOG_WINDOW_MINUTES,
            failure_policy: ClassificationFailurePolicy::FailOpen,
            require_realtime_approval: false,
            database_path: None,
            llm: None,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub max_rounds: Option<u32>,
    pub sufficient_confidence: Option<f64>,
    pub max_tool_calls: Option<u32>,
    pub max_concurrent_workers: Option<usize>,
    pub worker_timeout_secs: Option<u64>,
    pub per_round_timeout_secs: Option<u64>,
    pub classifier_timeout_secs: Option<u64>,
    pub syslog_window_minutes: Option<u32>,
    pub failure_policy: Option<ClassificationFailurePolicy>,
    pub require_realtime_approval: Option<bool>,
}

impl DiagnosisSettings {
    /// Apply a partial update to the settings
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.max_rounds {
            self.max_rounds = v;
        }
        if let Some(v) = update.sufficient_confidence {
            self.sufficient_confidence = v;
        }
        if let Some(v) = update.max_tool_calls {
            self.max_tool_calls = v;
        }
        if let Some(v) = update.max_concurrent_workers {
            self.max_concurrent_workers = v;
        }
        if let Some(v) = update.worker_timeout_secs {
            self.worker_timeout_secs = v;
        }
        if let Some(v) = update.per_round_timeout_secs {
            self.per_round_timeout_secs = v;
        }
        if let Some(v) = update.classifier_timeout_secs {
            self.classifier_timeout_secs = v;
        }
        if let Some(v) = update.syslog_window_minutes {
            self.syslog_window_minutes = v;
        }
        if let Some(v) = update.failure_policy {
            self.failure_policy = v;
        }
        if let Some(v) = update.require_realtime_approval {
            self.require_realtime_approval = v;
        }
    }

    /// Build the validated engine configuration.
    pub fn to_config(&self) -> CoreResult<DiagnosisConfig> {
        DiagnosisConfigBuilder::new()
            .max_rounds(self.max_rounds)
            .sufficient_confidence(self.sufficient_confidence)
            .max_tool_calls(self.max_tool_calls)
            .max_concurrent_workers(self.max_concurrent_workers)
            .worker_timeout(Duration::from_secs(self.worker_timeout_secs))
            .per_round_timeout(Duration::from_secs(self.per_round_timeout_secs))
            .classifier_timeout(Duration::from_secs(self.classifier_timeout_secs))
            .syslog_window_minutes(self.syslog_window_minutes)
            .failure_policy(self.failure_policy)
            .build()
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        self.to_config().map_err(|e| e.to_string())?;

        if let Some(path) = &self.database_path {
            if path.trim().is_empty() {
                return Err("database_path cannot be empty".to_string());
            }
        }

        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return Err("llm.model cannot be empty".to_string());
            }
        }

        Ok(())
    }
}
