//! Diagnosis Configuration Builder
//!
//! Follows the standard Rust builder pattern:
//! 1. Create with `::new()` or `::default()`
//! 2. Chain `.field(value)` calls
//! 3. Call `.build()` which validates and returns `CoreResult<DiagnosisConfig>`
//!
//! Validation happens at build time so that an invalid configuration is
//! rejected before any diagnosis round executes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_MAX_ROUNDS: u32 = 5;
pub const DEFAULT_SUFFICIENT_CONFIDENCE: f64 = 0.80;
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 6;
pub const DEFAULT_MAX_CONCURRENT_WORKERS: usize = 4;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PER_ROUND_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYSLOG_WINDOW_MINUTES: u32 = 60;

/// What the Guard does when the structured classifier cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationFailurePolicy {
    /// Treat the raw text as a sufficient fault report
    #[default]
    FailOpen,
    /// Ask the user to restate the problem
    FailClosed,
}

/// Validated diagnosis configuration (output of `DiagnosisConfigBuilder`).
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisConfig {
    pub max_rounds: u32,
    pub sufficient_confidence: f64,
    pub max_tool_calls: u32,
    pub max_concurrent_workers: usize,
    pub worker_timeout: Duration,
    pub per_round_timeout: Duration,
    pub classifier_timeout: Duration,
    pub syslog_window_minutes: u32,
    pub failure_policy: ClassificationFailurePolicy,
}

impl DiagnosisConfig {
    /// Overall wall-clock budget of one session.
    pub fn session_budget(&self) -> Duration {
        self.per_round_timeout.saturating_mul(self.max_rounds)
    }
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            sufficient_confidence: DEFAULT_SUFFICIENT_CONFIDENCE,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            worker_timeout: Duration::from_secs(DEFAULT_WORKER_TIMEOUT_SECS),
            per_round_timeout: Duration::from_secs(DEFAULT_PER_ROUND_TIMEOUT_SECS),
            classifier_timeout: Duration::from_secs(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
            syslog_window_minutes: DEFAULT_SYSLOG_WINDOW_MINUTES,
            failure_policy: ClassificationFailurePolicy::FailOpen,
        }
    }
}

/// Builder for diagnosis configuration.
///
/// # Example
/// ```ignore
/// let config = DiagnosisConfigBuilder::new()
///     .max_rounds(3)
///     .worker_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct DiagnosisConfigBuilder {
    max_rounds: Option<u32>,
    sufficient_confidence: Option<f64>,
    max_tool_calls: Option<u32>,
    max_concurrent_workers: Option<usize>,
    worker_timeout: Option<Duration>,
    per_round_timeout: Option<Duration>,
    classifier_timeout: Option<Duration>,
    syslog_window_minutes: Option<u32>,
    failure_policy: Option<ClassificationFailurePolicy>,
}

impl DiagnosisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the round budget (must be >= 1).
    pub fn max_rounds(mut self, n: u32) -> Self {
        self.max_rounds = Some(n);
        self
    }

    /// Set the per-layer confidence at which investigation stops.
    pub fn sufficient_confidence(mut self, c: f64) -> Self {
        self.sufficient_confidence = Some(c);
        self
    }

    /// Set the tool-call cap of a single worker run.
    pub fn max_tool_calls(mut self, n: u32) -> Self {
        self.max_tool_calls = Some(n);
        self
    }

    /// Set the worker pool size.
    pub fn max_concurrent_workers(mut self, n: usize) -> Self {
        self.max_concurrent_workers = Some(n);
        self
    }

    pub fn worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = Some(timeout);
        self
    }

    pub fn per_round_timeout(mut self, timeout: Duration) -> Self {
        self.per_round_timeout = Some(timeout);
        self
    }

    pub fn classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = Some(timeout);
        self
    }

    pub fn syslog_window_minutes(mut self, minutes: u32) -> Self {
        self.syslog_window_minutes = Some(minutes);
        self
    }

    pub fn failure_policy(mut self, policy: ClassificationFailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> CoreResult<DiagnosisConfig> {
        let defaults = DiagnosisConfig::default();

        let max_rounds = self.max_rounds.unwrap_or(defaults.max_rounds);
        if max_rounds == 0 {
            return Err(CoreError::invalid_configuration("max_rounds must be >= 1"));
        }

        let sufficient_confidence = self
            .sufficient_confidence
            .unwrap_or(defaults.sufficient_confidence);
        if !(sufficient_confidence > 0.0 && sufficient_confidence <= 1.0) {
            return Err(CoreError::invalid_configuration(format!(
                "sufficient_confidence must be in (0, 1], got {}",
                sufficient_confidence
            )));
        }

        let max_tool_calls = self.max_tool_calls.unwrap_or(defaults.max_tool_calls);
        if max_tool_calls == 0 {
            return Err(CoreError::invalid_configuration("max_tool_calls must be >= 1"));
        }

        let max_concurrent_workers = self
            .max_concurrent_workers
            .unwrap_or(defaults.max_concurrent_workers);
        if max_concurrent_workers == 0 {
            return Err(CoreError::invalid_configuration(
                "max_concurrent_workers must be >= 1",
            ));
        }

        let worker_timeout = self.worker_timeout.unwrap_or(defaults.worker_timeout);
        let per_round_timeout = self.per_round_timeout.unwrap_or(defaults.per_round_timeout);
        let classifier_timeout = self.classifier_timeout.unwrap_or(defaults.classifier_timeout);
        for (name, value) in [
            ("worker_timeout", worker_timeout),
            ("per_round_timeout", per_round_timeout),
            ("classifier_timeout", classifier_timeout),
        ] {
            if value.is_zero() {
                return Err(CoreError::invalid_configuration(format!(
                    "{} must be > 0",
                    name
                )));
            }
        }

        Ok(DiagnosisConfig {
            max_rounds,
            sufficient_confidence,
            max_tool_calls,
            max_concurrent_workers,
            worker_timeout,
            per_round_timeout,
            classifier_timeout,
            syslog_window_minutes: self
                .syslog_window_minutes
                .unwrap_or(defaults.syslog_window_minutes),
            failure_policy: self.failure_policy.unwrap_or(defaults.failure_policy),
        })
    }
}
