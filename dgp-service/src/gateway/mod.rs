//! Boundary to the external model that turns a fingerprint frame into a
//! blood-group report.
//!
//! Backends implement [`AnalysisGateway::request_report`] and may fail in any
//! way they like. Callers use [`AnalysisGateway::analyze`], which never fails:
//! every error becomes [`AnalysisResult::Failure`] with the fixed user-facing
//! message.

pub mod openrouter;
pub mod prompt;
pub mod schema;

use async_trait::async_trait;
use chrono::Local;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{AnalysisResult, CapturedImage, PatientDetails};

pub use openrouter::{OpenRouterConfig, OpenRouterGateway};
pub use schema::{ModelReport, parse_model_report};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to the analysis model failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("analysis model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis model returned an empty response")]
    EmptyResponse,

    #[error("analysis response is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("analysis response does not match the report schema: {0}")]
    SchemaViolation(String),

    #[error("analysis backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Ask the model for a report on `image`
    async fn request_report(
        &self,
        image: &CapturedImage,
        patient: &PatientDetails,
    ) -> Result<ModelReport, GatewayError>;

    /// Run one analysis and normalize the outcome. The success variant carries
    /// the patient and today's date alongside the model's findings.
    async fn analyze(&self, image: &CapturedImage, patient: &PatientDetails) -> AnalysisResult {
        if image.is_empty() {
            warn!("Analyzing an empty capture, the model is expected to reject it");
        }

        match self.request_report(image, patient).await {
            Ok(report) if report.detected => {
                info!(
                    report_id = %report.report_id,
                    blood_group = %report.predicted_blood_group,
                    "Analysis report received"
                );
                AnalysisResult::Success(Box::new(
                    report.into_report(patient.clone(), Local::now().date_naive()),
                ))
            }
            Ok(report) => {
                warn!(
                    report_id = %report.report_id,
                    "Model found no usable fingerprint in the capture"
                );
                AnalysisResult::failure()
            }
            Err(e) => {
                error!("Fingerprint analysis failed: {}", e);
                AnalysisResult::failure()
            }
        }
    }
}
