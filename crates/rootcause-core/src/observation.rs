//! Pre-digested observability input consumed by triage.

use serde::{Deserialize, Serialize};

use crate::model::ResourceKind;

/// Golden-signal readings for one resource. Missing readings are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoldenSignals {
    #[serde(default)]
    pub latency_p99_ms: Option<f64>,
    #[serde(default)]
    pub latency_baseline_ms: Option<f64>,
    /// Fraction of failed requests, `0.0..=1.0`.
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub error_rate_baseline: Option<f64>,
    /// Utilisation of the scarcest resource (cpu, memory, connections), `0.0..=1.0`.
    #[serde(default)]
    pub saturation: Option<f64>,
    #[serde(default)]
    pub request_rate: Option<f64>,
    #[serde(default)]
    pub request_rate_baseline: Option<f64>,
}

impl GoldenSignals {
    pub fn is_empty(&self) -> bool {
        self.latency_p99_ms.is_none()
            && self.error_rate.is_none()
            && self.saturation.is_none()
            && self.request_rate.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObservation {
    pub resource: String,
    #[serde(default)]
    pub kind: ResourceKind,
    /// `None` when no data could be obtained for the resource.
    #[serde(default)]
    pub signals: Option<GoldenSignals>,
    /// Free-form findings (pod statuses, slow traces) left for the oracle.
    #[serde(default)]
    pub anomalies: Vec<String>,
}

impl ResourceObservation {
    pub fn has_data(&self) -> bool {
        self.signals.as_ref().is_some_and(|s| !s.is_empty()) || !self.anomalies.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilitySummary {
    pub resources: Vec<ResourceObservation>,
}
