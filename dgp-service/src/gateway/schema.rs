use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::GatewayError;
use crate::models::{AnalysisReport, BloodProbability, FingerprintType, PatientDetails};

/// The model's answer, decoded strictly: required fields must be present,
/// enum fields must hold a known value and unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelReport {
    pub detected: bool,
    pub predicted_blood_group: String,
    pub report_id: String,
    #[serde(default)]
    pub fingerprint_type: Option<FingerprintType>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub probabilities: Option<Vec<BloodProbability>>,
}

impl ModelReport {
    pub fn into_report(
        self,
        patient_details: PatientDetails,
        report_date: NaiveDate,
    ) -> AnalysisReport {
        AnalysisReport {
            fingerprint_type: self.fingerprint_type,
            predicted_blood_group: self.predicted_blood_group,
            confidence_score: self.confidence_score,
            reasoning: self.reasoning,
            probabilities: self.probabilities,
            report_id: self.report_id,
            patient_details,
            report_date,
        }
    }
}

/// Decode the text the model returned. Markdown code fences around the JSON
/// are tolerated.
pub fn parse_model_report(raw: &str) -> Result<ModelReport, GatewayError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(GatewayError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(cleaned).map_err(GatewayError::MalformedJson)?;
    if !value.is_object() {
        return Err(GatewayError::SchemaViolation(
            "expected a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| GatewayError::SchemaViolation(e.to_string()))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// JSON schema sent with the request as the structured-output contract
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "detected": {
                "type": "boolean",
                "description": "True unless the image is corrupt or holds no fingerprint."
            },
            "fingerprintType": {
                "type": "string",
                "enum": ["Loop", "Whorl", "Arch", "Composite"]
            },
            "predictedBloodGroup": {
                "type": "string",
                "description": "ABO/Rh label such as 'O+', 'A-', 'B+', 'AB+'"
            },
            "confidenceScore": { "type": "number" },
            "reasoning": {
                "type": "string",
                "description": "Clinical-style explanation of the finding."
            },
            "probabilities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "group": { "type": "string" },
                        "percentage": { "type": "number" }
                    },
                    "required": ["group", "percentage"]
                }
            },
            "reportId": {
                "type": "string",
                "description": "Unique report identifier, e.g. DGP-2024-017"
            }
        },
        "required": ["detected", "predictedBloodGroup", "reportId"]
    })
}
