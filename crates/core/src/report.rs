//! Diagnosis Report
//!
//! The final, immutable artifact of a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layer::Layer;

/// Key used in `per_device_summaries` when a session had no device scope.
pub const UNSCOPED_DEVICE: &str = "unscoped";

/// Health verdict for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// The confirmed root cause sits on this device
    Faulty,
    /// Evidence on this device points at a problem but nothing is confirmed
    Suspect,
    /// Investigated, nothing conclusive
    Inconclusive,
}

/// Summary of what was learned about one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub status: DeviceStatus,
    pub layer_findings: BTreeMap<Layer, Vec<String>>,
    pub confidence: f64,
}

/// Structured root-cause report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub fault_description: String,
    pub root_cause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_layer: Option<Layer>,
    pub confidence: f64,
    pub evidence_chain: Vec<String>,
    pub per_device_summaries: BTreeMap<String, DeviceSummary>,
    pub recommended_action: String,
    pub tags: Vec<String>,
    /// False when the session ended without a confirmed root cause
    pub complete: bool,
}

impl DiagnosisReport {
    /// Render the report as a short plain-text summary.
    pub fn summary(&self) -> String {
        let layer = self
            .root_cause_layer
            .map(|l| format!("{} ({})", l, l.description()))
            .unwrap_or_else(|| "undetermined".to_string());
        format!(
            "{}\nRoot cause: {}\nLayer: {}\nConfidence: {:.0}%\nAction: {}",
            self.fault_description,
            self.root_cause,
            layer,
            self.confidence * 100.0,
            self.recommended_action
        )
    }
}
