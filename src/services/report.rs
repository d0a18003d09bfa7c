//! Report Synthesizer
//!
//! Turns the final `SupervisorState` into a `DiagnosisReport`. Pure: the
//! same state and context always produce the same report.

use std::collections::BTreeMap;

use netdiag_core::{
    DeviceStatus, DeviceSummary, DiagnosisContext, DiagnosisReport, IncompleteReason, Layer,
    SupervisorState, UNSCOPED_DEVICE,
};

/// Device confidence from which an unconfirmed device is reported as suspect.
const SUSPECT_CONFIDENCE: f64 = 0.5;

pub struct ReportSynthesizer;

impl ReportSynthesizer {
    /// Build the report for a session that reached `Reporting`.
    pub fn synthesize(state: &SupervisorState, context: &DiagnosisContext) -> DiagnosisReport {
        let confirmed = state.root_cause_confirmed();
        let hypothesis = state.hypothesis.as_ref().filter(|_| confirmed);

        let root_cause = match hypothesis {
            Some(h) => h.description.clone(),
            None => Self::incomplete_root_cause(state),
        };
        let root_cause_layer = hypothesis.map(|h| h.layer);
        let root_cause_device = hypothesis.and_then(|h| h.device.clone());
        let confidence = hypothesis
            .map(|h| h.confidence)
            .unwrap_or_else(|| state.max_confidence());

        DiagnosisReport {
            fault_description: context.symptom.clone(),
            root_cause,
            root_cause_device: root_cause_device.clone(),
            root_cause_layer,
            confidence,
            evidence_chain: Self::evidence_chain(state, confirmed),
            per_device_summaries: Self::device_summaries(state, root_cause_device.as_deref(), confirmed),
            recommended_action: Self::recommended_action(state, root_cause_layer, root_cause_device.as_deref()),
            tags: Self::tags(state, context, confirmed),
            complete: confirmed,
        }
    }

    fn incomplete_root_cause(state: &SupervisorState) -> String {
        match state.incomplete_reason {
            Some(reason) if reason.is_interrupted() => {
                "diagnosis incomplete, partial findings below".to_string()
            }
            Some(IncompleteReason::NoCandidateLayers) => {
                "diagnosis incomplete: no conclusive root cause found and no layer left to investigate"
                    .to_string()
            }
            _ => format!(
                "diagnosis incomplete: no conclusive root cause found within the round budget ({} rounds)",
                state.max_rounds
            ),
        }
    }

    fn evidence_chain(state: &SupervisorState, confirmed: bool) -> Vec<String> {
        let mut chain: Vec<String> = state
            .scoping_notes
            .iter()
            .map(|note| format!("[scoping] {}", note))
            .collect();
        for layer in &state.investigation_order {
            if let Some(status) = state.layer(*layer) {
                chain.extend(status.findings.iter().map(|f| format!("[{}] {}", layer, f)));
            }
        }
        // Prior findings seeded into layers no worker reached.
        for status in state.layer_statuses.values().filter(|s| !s.investigated) {
            chain.extend(
                status
                    .findings
                    .iter()
                    .map(|f| format!("[scoping] [{}] {}", status.layer, f)),
            );
        }
        if let (false, Some(h)) = (confirmed, state.hypothesis.as_ref()) {
            chain.push(format!(
                "[{}] unverified hypothesis ({:.2}, {}): {}",
                h.layer, h.confidence, h.source, h.description
            ));
        }
        chain
    }

    fn device_summaries(
        state: &SupervisorState,
        root_cause_device: Option<&str>,
        confirmed: bool,
    ) -> BTreeMap<String, DeviceSummary> {
        let devices: Vec<String> = if state.device_scope.is_empty() {
            vec![UNSCOPED_DEVICE.to_string()]
        } else {
            state.device_scope.clone()
        };
        let suspect_device = state
            .hypothesis
            .as_ref()
            .filter(|_| !confirmed)
            .and_then(|h| h.device.as_deref());

        let mut summaries = BTreeMap::new();
        for device in &devices {
            let mut layer_findings: BTreeMap<Layer, Vec<String>> = BTreeMap::new();
            let mut device_confidence = 0.0_f64;

            for status in state.layer_statuses.values().filter(|s| s.investigated) {
                let mentions_any = status
                    .findings
                    .iter()
                    .any(|f| state.device_scope.iter().any(|d| mentions(f, d)));
                let findings: Vec<String> = if mentions_any {
                    status
                        .findings
                        .iter()
                        .filter(|f| mentions(f, device))
                        .cloned()
                        .collect()
                } else {
                    status.findings.clone()
                };
                if !findings.is_empty() {
                    device_confidence = device_confidence.max(status.confidence);
                }
                layer_findings.insert(status.layer, findings);
            }

            let status = if confirmed && root_cause_device == Some(device.as_str()) {
                DeviceStatus::Faulty
            } else if suspect_device == Some(device.as_str()) || device_confidence >= SUSPECT_CONFIDENCE {
                DeviceStatus::Suspect
            } else {
                DeviceStatus::Inconclusive
            };

            summaries.insert(
                device.clone(),
                DeviceSummary {
                    status,
                    layer_findings,
                    confidence: device_confidence,
                },
            );
        }
        summaries
    }

    fn recommended_action(state: &SupervisorState, layer: Option<Layer>, device: Option<&str>) -> String {
        let target = device
            .map(str::to_string)
            .or_else(|| (!state.device_scope.is_empty()).then(|| state.device_scope.join(", ")))
            .unwrap_or_else(|| "the affected devices".to_string());
        match layer {
            Some(Layer::L1) => format!(
                "Inspect the physical path on {}: optics and cabling, interface error counters, VLAN and STP state.",
                target
            ),
            Some(Layer::L2) => format!(
                "Check routing on {}: routing table, protocol neighbors and addressing along the path.",
                target
            ),
            Some(Layer::L3) => format!(
                "Check transport policy on {}: ACL and firewall rules for the affected ports, session tables and MTU.",
                target
            ),
            Some(Layer::L4) => format!(
                "Check the application side for {}: DNS resolution, service health and listening ports.",
                target
            ),
            None => match state.incomplete_reason {
                Some(reason) if reason.is_interrupted() => {
                    "Re-run the diagnosis; the session stopped before all layers were investigated.".to_string()
                }
                _ => format!(
                    "No conclusive evidence; verify {} manually starting from the highest-confidence layer.",
                    target
                ),
            },
        }
    }

    fn tags(state: &SupervisorState, context: &DiagnosisContext, confirmed: bool) -> Vec<String> {
        let mut tags = Vec::new();
        if let Some(h) = state.hypothesis.as_ref().filter(|_| confirmed) {
            tags.push(format!("layer:{}", h.layer));
            tags.push(format!("source:{}", h.source));
        }
        tags.push(format!("symptom:{}", context.symptom_type));
        if !confirmed {
            tags.push("incomplete".to_string());
            if let Some(reason) = state.incomplete_reason {
                tags.push(format!("incomplete:{}", Self::reason_tag(reason)));
            }
        }
        tags
    }

    fn reason_tag(reason: IncompleteReason) -> &'static str {
        match reason {
            IncompleteReason::RoundBudgetExhausted => "round_budget_exhausted",
            IncompleteReason::SessionTimeout => "session_timeout",
            IncompleteReason::Cancelled => "cancelled",
            IncompleteReason::NoCandidateLayers => "no_candidate_layers",
        }
    }
}

/// Whether `finding` names `device` as a whole token, so `R1` does not
/// match `R10` and `10.0.0.1` does not match `10.0.0.10`.
fn mentions(finding: &str, device: &str) -> bool {
    finding
        .split(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        .map(|token| token.trim_end_matches(['.', '-', '_']))
        .any(|token| token.eq_ignore_ascii_case(device))
}
