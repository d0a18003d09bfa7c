//! Troubleshooting Layers and Evidence Sources
//!
//! The engine uses its own four-layer troubleshooting model (not strict OSI):
//!
//! - `L1` - physical / data-link (optics, cabling, interface errors, VLAN, STP)
//! - `L2` - network (addressing, routing protocols, reachability)
//! - `L3` - transport (TCP/UDP sessions, ports, ACL on flows)
//! - `L4` - application (DNS, HTTP, service health)
//!
//! Layers are totally ordered from the bottom of the stack up. The ordering is
//! load-bearing: results are integrated L1 → L4 and the lowest layer wins
//! root-cause ties.

use serde::{Deserialize, Serialize};

/// Highest confidence attributable to periodically collected telemetry.
pub const HISTORICAL_CONFIDENCE_CAP: f64 = 0.60;

/// Highest confidence attributable to a live device query.
pub const REALTIME_CONFIDENCE_CAP: f64 = 0.95;

/// Troubleshooting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    L1,
    L2,
    L3,
    L4,
}

impl Layer {
    /// All layers in physical order (bottom of the stack first).
    pub const ALL: [Layer; 4] = [Layer::L1, Layer::L2, Layer::L3, Layer::L4];

    /// Short human-readable description of the layer.
    pub fn description(&self) -> &'static str {
        match self {
            Layer::L1 => "physical/data-link",
            Layer::L2 => "network",
            Layer::L3 => "transport",
            Layer::L4 => "application",
        }
    }

    /// Parse a layer tag such as `"L3"` or `"l3"`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "L1" => Some(Layer::L1),
            "L2" => Some(Layer::L2),
            "L3" => Some(Layer::L3),
            "L4" => Some(Layer::L4),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::L1 => write!(f, "L1"),
            Layer::L2 => write!(f, "L2"),
            Layer::L3 => write!(f, "L3"),
            Layer::L4 => write!(f, "L4"),
        }
    }
}

/// Where a piece of evidence came from.
///
/// Also acts as the tag that selects which worker variant executes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Periodically collected telemetry (stale, cheap)
    Historical,
    /// Live device / configuration query (fresh, expensive)
    Realtime,
}

impl EvidenceSource {
    /// Architectural confidence ceiling for this source.
    pub fn cap(&self) -> f64 {
        match self {
            EvidenceSource::Historical => HISTORICAL_CONFIDENCE_CAP,
            EvidenceSource::Realtime => REALTIME_CONFIDENCE_CAP,
        }
    }

    /// Clamp a raw confidence into `[0, cap]` for this source.
    ///
    /// NaN is treated as no confidence at all.
    pub fn clamp(&self, confidence: f64) -> f64 {
        if confidence.is_nan() {
            return 0.0;
        }
        confidence.clamp(0.0, 1.0).min(self.cap())
    }
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceSource::Historical => write!(f, "historical"),
            EvidenceSource::Realtime => write!(f, "realtime"),
        }
    }
}
