use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-facing message carried by every failed analysis
pub const ANALYSIS_FAILURE_MESSAGE: &str = "Unable to generate report. Please try the scan again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Demographics collected on the intake form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetails {
    pub full_name: String,
    #[serde(default)]
    pub father_name: String,
    /// Whole years, kept as text the way the form submits it
    pub age: String,
    pub gender: Gender,
    pub contact_number: String,
}

impl PatientDetails {
    pub const MAX_AGE: u16 = 150;

    /// Names of the required fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("fullName", &self.full_name),
            ("age", &self.age),
            ("contactNumber", &self.contact_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Names of filled-in fields whose value is unusable. Age must be a
    /// whole number of years up to `MAX_AGE`.
    pub fn malformed_fields(&self) -> Vec<&'static str> {
        let age = self.age.trim();
        let age_ok = age.is_empty()
            || age
                .parse::<u16>()
                .is_ok_and(|years| years <= Self::MAX_AGE);
        if age_ok { Vec::new() } else { vec!["age"] }
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty() && self.malformed_fields().is_empty()
    }
}

/// Encoded fingerprint frame. Always PNG; an empty payload marks a capture
/// that could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImage {
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

impl CapturedImage {
    pub const MIME_TYPE: &'static str = "image/png";

    pub fn from_png(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn empty() -> Self {
        Self { data: Vec::new() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MIME_TYPE, self.to_base64())
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintType {
    Loop,
    Whorl,
    Arch,
    Composite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodProbability {
    pub group: String,
    pub percentage: f64,
}

/// A completed report: the model's findings joined with the patient they
/// were produced for
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub fingerprint_type: Option<FingerprintType>,
    pub predicted_blood_group: String,
    pub confidence_score: Option<f64>,
    pub reasoning: Option<String>,
    pub probabilities: Option<Vec<BloodProbability>>,
    pub report_id: String,
    pub patient_details: PatientDetails,
    pub report_date: NaiveDate,
}

/// Outcome of one analysis. Serialized flat with a `detected` flag, so
/// clients see either the report fields or an `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AnalysisResultWire", into = "AnalysisResultWire")]
pub enum AnalysisResult {
    Success(Box<AnalysisReport>),
    Failure { error: String },
}

impl AnalysisResult {
    pub fn failure() -> Self {
        Self::Failure {
            error: ANALYSIS_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn detected(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            Self::Success(report) => Some(&**report),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error } => Some(error),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResultWire {
    detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient_details: Option<PatientDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint_type: Option<FingerprintType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    predicted_blood_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probabilities: Option<Vec<BloodProbability>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report_id: Option<String>,
}

impl From<AnalysisResult> for AnalysisResultWire {
    fn from(result: AnalysisResult) -> Self {
        match result {
            AnalysisResult::Success(report) => {
                let report = *report;
                Self {
                    detected: true,
                    patient_details: Some(report.patient_details),
                    fingerprint_type: report.fingerprint_type,
                    predicted_blood_group: Some(report.predicted_blood_group),
                    confidence_score: report.confidence_score,
                    reasoning: report.reasoning,
                    probabilities: report.probabilities,
                    error: None,
                    report_date: Some(report.report_date),
                    report_id: Some(report.report_id),
                }
            }
            AnalysisResult::Failure { error } => Self {
                detected: false,
                patient_details: None,
                fingerprint_type: None,
                predicted_blood_group: None,
                confidence_score: None,
                reasoning: None,
                probabilities: None,
                error: Some(error),
                report_date: None,
                report_id: None,
            },
        }
    }
}

impl TryFrom<AnalysisResultWire> for AnalysisResult {
    type Error = String;

    fn try_from(wire: AnalysisResultWire) -> Result<Self, Self::Error> {
        if !wire.detected {
            return Ok(Self::Failure {
                error: wire
                    .error
                    .unwrap_or_else(|| ANALYSIS_FAILURE_MESSAGE.to_string()),
            });
        }
        let missing = |field: &str| format!("detected result is missing {field}");
        Ok(Self::Success(Box::new(AnalysisReport {
            fingerprint_type: wire.fingerprint_type,
            predicted_blood_group: wire
                .predicted_blood_group
                .ok_or_else(|| missing("predictedBloodGroup"))?,
            confidence_score: wire.confidence_score,
            reasoning: wire.reasoning,
            probabilities: wire.probabilities,
            report_id: wire.report_id.ok_or_else(|| missing("reportId"))?,
            patient_details: wire
                .patient_details
                .ok_or_else(|| missing("patientDetails"))?,
            report_date: wire.report_date.ok_or_else(|| missing("reportDate"))?,
        })))
    }
}

/// The four screens of the scan-to-report flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Form,
    Scanning,
    Analyzing,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub state: ScanState,
    pub progress: u8,
}

impl ScanStatus {
    pub const IDLE: ScanStatus = ScanStatus {
        state: ScanState::Idle,
        progress: 0,
    };
}

/// Everything a screen needs to render one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub session_id: String,
    pub phase: Phase,
    pub patient_details: Option<PatientDetails>,
    pub analysis_result: Option<AnalysisResult>,
    pub scan: ScanStatus,
    pub status_message: Option<String>,
    /// Set once the gateway call for the current capture has started
    pub analysis_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadScanRequest {
    /// Raw base64 or a `data:<mime>;base64,` URL
    pub image_base64: String,
}

impl UploadScanRequest {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = self.image_base64.trim();
        let encoded = match payload.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => payload,
        };
        STANDARD.decode(encoded)
    }
}
