use triage_core::domain::CanonicalIncident;
use triage_core::error::AppError;

pub fn analysis_prompt(incident: &CanonicalIncident) -> Result<String, AppError> {
    let incident_json = serde_json::to_string_pretty(incident).map_err(|e| {
        AppError::new("AI_PROMPT_FAILED", "Failed to serialize incident for prompt")
            .with_details(e.to_string())
    })?;
    let source = incident.source.label();
    let kind = &incident.kind;
    let timestamp = &incident.timestamp;

    // Keep the contract explicit:
    // - Severity comes from a closed set.
    // - The answer is a single JSON object (a ```json fence is tolerated).
    Ok(format!(
        r#"You are an expert DevOps and SRE incident response AI. Analyze this incident and provide a structured response.

**Incident Details:**
Source: {source}
Type: {kind}
Timestamp: {timestamp}

**Incident Data:**
{incident_json}

**Your Task:**
Analyze this incident and provide:
1. Severity Level (critical/high/medium/low)
2. Root Cause Analysis - What likely caused this issue?
3. Impact Assessment - What systems/users are affected?
4. Immediate Actions - What should be done RIGHT NOW?
5. Recommended Fix - Step-by-step resolution
6. Prevention - How to prevent this in the future?

**Response Format (JSON):**
```json
{{
  "severity": "critical|high|medium|low",
  "title": "Brief incident description",
  "root_cause": "Likely root cause",
  "impact": "Impact description",
  "immediate_actions": ["action 1", "action 2"],
  "resolution_steps": ["step 1", "step 2"],
  "prevention": ["prevention 1", "prevention 2"]
}}
```

Provide ONLY the JSON response."#
    ))
}
