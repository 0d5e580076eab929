use triage_core::domain::{AnalysisResult, CanonicalIncident};
use triage_core::error::AppError;

use crate::llm::{infer, InferenceBackend, InferenceOutput};
use crate::reconcile::reconcile;

pub mod prompts;

/// Prompt, infer, reconcile. Backend and output failures degrade to the default analysis;
/// only prompt construction can fail.
pub fn analyze_incident(
    backend: &dyn InferenceBackend,
    incident: &CanonicalIncident,
) -> Result<AnalysisResult, AppError> {
    tracing::info!(source = %incident.source, kind = %incident.kind, "analyzing incident");

    let prompt = prompts::analysis_prompt(incident)?;
    let output = infer(backend, &prompt);
    let mut analysis = reconcile(output.text(), incident, backend.analyzed_by());

    if let InferenceOutput::Failed { marker, .. } = &output {
        analysis.fallback_reason = Some(marker.clone());
    }

    tracing::info!(
        incident_id = %analysis.incident_id,
        severity = %analysis.severity,
        degraded = analysis.fallback_reason.is_some(),
        "analysis complete"
    );
    Ok(analysis)
}
