//! Symptom detection from golden signals.
//!
//! Static thresholds run first and are authoritative. The oracle is consulted
//! only for free-form anomaly lines, and every symptom it proposes must cite
//! evidence that belongs to the same resource.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use rootcause_config::{DependencyGraph, TriageThresholds};
use rootcause_core::{
    DiagnosisError, GoldenSignals, ObservabilitySummary, OracleError, ProposedSymptom, ReasoningOracle,
    ResourceKind, ResourceObservation, SignalCategory, Stage, StageAction, StageContext, Symptom,
    SymptomListSubmission, SymptomSource, ToolGateway,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::consult::consult;

/// Gateway tool returning golden signals and anomaly lines for one resource.
pub const TRIAGE_METRICS_TOOL: &str = "get_triage_metrics";

pub struct Triage {
    thresholds: TriageThresholds,
    retries: u32,
}

/// One anomaly line the oracle may cite as `ev-N`.
#[derive(Debug, Clone, Serialize)]
struct EvidenceEntry {
    id: String,
    resource: String,
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct TriageMetrics {
    #[serde(default)]
    signals: Option<GoldenSignals>,
    #[serde(default)]
    anomalies: Vec<String>,
}

impl Triage {
    pub fn new(thresholds: TriageThresholds, retries: u32) -> Self {
        Self { thresholds, retries }
    }

    /// Collects golden signals for every service and pod in the graph.
    /// Resources the gateway cannot describe are kept with no signals.
    pub async fn gather(gateway: &dyn ToolGateway, graph: &DependencyGraph) -> ObservabilitySummary {
        let targets: Vec<_> = graph
            .nodes()
            .filter(|n| matches!(n.kind, ResourceKind::Service | ResourceKind::Pod))
            .collect();

        let futures = targets.iter().map(|node| async move {
            let args = json!({"resource": node.id, "kind": node.kind.as_str()});
            let metrics = match gateway.invoke(TRIAGE_METRICS_TOOL, &args).await {
                Ok(value) => serde_json::from_value::<TriageMetrics>(value).unwrap_or_else(|e| {
                    warn!(resource = %node.id, "Unreadable triage metrics: {}", e);
                    TriageMetrics::default()
                }),
                Err(e) => {
                    warn!(resource = %node.id, "No triage metrics: {}", e);
                    TriageMetrics::default()
                }
            };
            ResourceObservation {
                resource: node.id.clone(),
                kind: node.kind,
                signals: metrics.signals,
                anomalies: metrics.anomalies,
            }
        });

        ObservabilitySummary {
            resources: join_all(futures).await,
        }
    }

    /// Deterministic pass. Fails with `InsufficientData` when no resource
    /// carries any signal or anomaly.
    pub fn detect(&self, summary: &ObservabilitySummary) -> Result<Vec<Symptom>, DiagnosisError> {
        ensure_data(summary)?;
        let mut merged = BTreeMap::new();
        for observation in &summary.resources {
            let Some(signals) = &observation.signals else { continue };
            for symptom in self.evaluate(observation, signals) {
                merge(&mut merged, symptom);
            }
        }
        Ok(ordered(merged))
    }

    /// Full triage: heuristics, then oracle findings for anomaly lines.
    pub async fn triage(
        &self,
        summary: &ObservabilitySummary,
        oracle: &dyn ReasoningOracle,
    ) -> Result<Vec<Symptom>, DiagnosisError> {
        let heuristic = self.detect(summary)?;
        let catalog = evidence_catalog(summary);

        info!("║ TRIAGE: {} heuristic symptom(s), {} anomaly line(s)", heuristic.len(), catalog.len());
        if catalog.is_empty() {
            return Ok(heuristic);
        }

        let context = StageContext::new(
            Stage::Triage,
            json!({
                "resources": summary.resources,
                "evidence": catalog,
                "confirmed": heuristic,
            }),
        );
        let proposed = consult(oracle, context, self.retries, |raw| {
            let submission = StageAction::<SymptomListSubmission>::parse_submission(raw)?;
            validate_proposals(&submission.symptoms, summary, &catalog)?;
            Ok(submission.symptoms)
        })
        .await;

        let proposed = match proposed {
            Ok(symptoms) => symptoms,
            Err(e) => {
                warn!("Oracle triage unusable, keeping heuristic symptoms: {}", e);
                return Ok(heuristic);
            }
        };

        let mut merged: BTreeMap<_, _> = heuristic.into_iter().map(|s| ((s.resource.clone(), s.category), s)).collect();
        for p in proposed {
            let key = (p.resource.clone(), p.category);
            if merged.get(&key).is_some_and(|s: &Symptom| s.source == SymptomSource::Heuristic) {
                debug!(resource = %p.resource, category = %p.category, "Oracle symptom shadowed by heuristic");
                continue;
            }
            let kind = kind_of(summary, &p.resource);
            merge(
                &mut merged,
                Symptom::new(p.resource, kind, p.category, p.evidence, p.severity, SymptomSource::Oracle),
            );
        }
        Ok(ordered(merged))
    }

    fn evaluate(&self, observation: &ResourceObservation, signals: &GoldenSignals) -> Vec<Symptom> {
        let t = &self.thresholds;
        let mut found = Vec::new();
        let mut push = |category, evidence: String, excess: f64| {
            found.push(Symptom::new(
                observation.resource.clone(),
                observation.kind,
                category,
                evidence,
                excess_severity(excess),
                SymptomSource::Heuristic,
            ));
        };

        if let Some(p99) = signals.latency_p99_ms {
            match signals.latency_baseline_ms.filter(|b| *b > 0.0) {
                Some(baseline) => {
                    let ratio = p99 / baseline;
                    if ratio >= t.latency_ratio {
                        push(
                            SignalCategory::Latency,
                            format!("p99 latency {:.0}ms is {:.1}x the {:.0}ms baseline", p99, ratio, baseline),
                            ratio / t.latency_ratio,
                        );
                    }
                }
                None if p99 >= t.latency_static_ms => push(
                    SignalCategory::Latency,
                    format!("p99 latency {:.0}ms exceeds {:.0}ms", p99, t.latency_static_ms),
                    p99 / t.latency_static_ms,
                ),
                None => {}
            }
        }

        if let Some(rate) = signals.error_rate {
            let above_baseline = signals
                .error_rate_baseline
                .filter(|b| *b > 0.0)
                .map_or(true, |b| rate >= b * t.error_ratio);
            if rate >= t.error_rate && above_baseline {
                push(
                    SignalCategory::Errors,
                    format!("error rate {:.1}% over the {:.1}% threshold", rate * 100.0, t.error_rate * 100.0),
                    rate / t.error_rate,
                );
            }
        }

        if let Some(saturation) = signals.saturation {
            if saturation >= t.saturation {
                push(
                    SignalCategory::Saturation,
                    format!("saturation at {:.0}%", saturation * 100.0),
                    saturation / t.saturation,
                );
            }
        }

        if let (Some(rate), Some(baseline)) = (signals.request_rate, signals.request_rate_baseline.filter(|b| *b > 0.0)) {
            let deviation = (rate - baseline).abs() / baseline;
            if deviation >= t.traffic_deviation {
                let direction = if rate < baseline { "dropped" } else { "spiked" };
                push(
                    SignalCategory::Traffic,
                    format!("request rate {} to {:.1}/s from {:.1}/s", direction, rate, baseline),
                    deviation / t.traffic_deviation,
                );
            }
        }

        found
    }
}

/// Maps threshold excess (1.0 = exactly at threshold) onto `0.5..=1.0`.
fn excess_severity(excess: f64) -> f64 {
    if !excess.is_finite() {
        return 1.0;
    }
    (1.0 - 0.5 / excess.max(1.0)).clamp(0.5, 1.0)
}

fn ensure_data(summary: &ObservabilitySummary) -> Result<(), DiagnosisError> {
    if summary.resources.iter().any(|r| r.has_data()) {
        return Ok(());
    }
    Err(DiagnosisError::InsufficientData(format!(
        "no signals or anomalies for any of {} resource(s)",
        summary.resources.len()
    )))
}

fn evidence_catalog(summary: &ObservabilitySummary) -> Vec<EvidenceEntry> {
    summary
        .resources
        .iter()
        .flat_map(|r| r.anomalies.iter().map(move |text| (r.resource.clone(), text.clone())))
        .enumerate()
        .map(|(i, (resource, text))| EvidenceEntry {
            id: format!("ev-{}", i + 1),
            resource,
            text,
        })
        .collect()
}

fn validate_proposals(
    proposals: &[ProposedSymptom],
    summary: &ObservabilitySummary,
    catalog: &[EvidenceEntry],
) -> Result<(), OracleError> {
    let known: BTreeSet<&str> = summary.resources.iter().map(|r| r.resource.as_str()).collect();
    for p in proposals {
        if !known.contains(p.resource.as_str()) {
            return Err(OracleError::SchemaValidation(format!("unknown resource `{}`", p.resource)));
        }
        if !p.severity.is_finite() || !(0.0..=1.0).contains(&p.severity) {
            return Err(OracleError::SchemaValidation(format!(
                "severity {} for `{}` outside 0..=1",
                p.severity, p.resource
            )));
        }
        if p.evidence_refs.is_empty() {
            return Err(OracleError::SchemaValidation(format!(
                "symptom on `{}` cites no evidence",
                p.resource
            )));
        }
        for evidence_ref in &p.evidence_refs {
            let cited = catalog.iter().find(|e| &e.id == evidence_ref);
            match cited {
                Some(entry) if entry.resource == p.resource => {}
                Some(entry) => {
                    return Err(OracleError::SchemaValidation(format!(
                        "evidence {} belongs to `{}`, not `{}`",
                        evidence_ref, entry.resource, p.resource
                    )))
                }
                None => {
                    return Err(OracleError::SchemaValidation(format!("unknown evidence id {}", evidence_ref)))
                }
            }
        }
    }
    Ok(())
}

fn kind_of(summary: &ObservabilitySummary, resource: &str) -> ResourceKind {
    summary
        .resources
        .iter()
        .find(|r| r.resource == resource)
        .map(|r| r.kind)
        .unwrap_or_default()
}

/// Keeps one symptom per `(resource, category)`, the most severe.
fn merge(merged: &mut BTreeMap<(String, SignalCategory), Symptom>, symptom: Symptom) {
    let key = (symptom.resource.clone(), symptom.category);
    match merged.get(&key) {
        Some(existing) if existing.severity >= symptom.severity => {}
        _ => {
            merged.insert(key, symptom);
        }
    }
}

fn ordered(merged: BTreeMap<(String, SignalCategory), Symptom>) -> Vec<Symptom> {
    let mut symptoms: Vec<_> = merged.into_values().collect();
    symptoms.sort_by(|a, b| b.severity.total_cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
    symptoms
}
