//! Diagnosis Context
//!
//! The structured description of a fault extracted from a user's symptom
//! report. Created by the Guard, validated at session start, then read by
//! the Supervisor (device scope, layer hint) and the report synthesizer.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::layer::Layer;

/// Broad category of the reported symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SymptomType {
    Connectivity,
    Performance,
    Routing,
    Protocol,
    Hardware,
    #[default]
    Unknown,
}

impl std::fmt::Display for SymptomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SymptomType::Connectivity => "connectivity",
            SymptomType::Performance => "performance",
            SymptomType::Routing => "routing",
            SymptomType::Protocol => "protocol",
            SymptomType::Hardware => "hardware",
            SymptomType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Structured diagnostic context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisContext {
    /// Free-text description of the malfunction (required, non-empty)
    pub symptom: String,
    /// Symptom category
    #[serde(default)]
    pub symptom_type: SymptomType,
    /// Device the problem is observed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_device: Option<String>,
    /// Device or address that cannot be reached / is misbehaving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device: Option<String>,
    /// Protocol named in the report (e.g. "OSPF", "TCP")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_hint: Option<String>,
    /// Layer the report points at, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_hint: Option<Layer>,
}

impl DiagnosisContext {
    /// Create a context with only a symptom.
    pub fn new(symptom: impl Into<String>) -> Self {
        Self {
            symptom: symptom.into(),
            symptom_type: SymptomType::Unknown,
            source_device: None,
            target_device: None,
            protocol_hint: None,
            layer_hint: None,
        }
    }

    pub fn with_symptom_type(mut self, symptom_type: SymptomType) -> Self {
        self.symptom_type = symptom_type;
        self
    }

    pub fn with_source(mut self, device: impl Into<String>) -> Self {
        self.source_device = Some(device.into());
        self
    }

    pub fn with_target(mut self, device: impl Into<String>) -> Self {
        self.target_device = Some(device.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol_hint = Some(protocol.into());
        self
    }

    pub fn with_layer_hint(mut self, layer: Layer) -> Self {
        self.layer_hint = Some(layer);
        self
    }

    /// Trim fields and drop blank optional values.
    pub fn normalized(mut self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        self.symptom = self.symptom.trim().to_string();
        self.source_device = clean(self.source_device);
        self.target_device = clean(self.target_device);
        self.protocol_hint = clean(self.protocol_hint);
        self
    }

    /// Whether a diagnosis can start from this context: a non-empty symptom
    /// and at least one device identifier.
    pub fn is_sufficient(&self) -> bool {
        !self.symptom.trim().is_empty() && self.has_device()
    }

    /// Whether a source or target device is present.
    pub fn has_device(&self) -> bool {
        let present = |d: &Option<String>| d.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.source_device) || present(&self.target_device)
    }

    /// Devices named by the context, source first, deduplicated.
    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = Vec::new();
        for device in [&self.source_device, &self.target_device].into_iter().flatten() {
            let device = device.trim();
            if !device.is_empty() && !devices.iter().any(|d| d == device) {
                devices.push(device.to_string());
            }
        }
        devices
    }

    /// Reject contexts a session must not start from.
    pub fn validate(&self) -> CoreResult<()> {
        if self.symptom.trim().is_empty() {
            return Err(CoreError::invalid_configuration(
                "diagnosis context requires a non-empty symptom",
            ));
        }
        Ok(())
    }
}
