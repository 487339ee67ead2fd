use async_trait::async_trait;
use dgp_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::session_keys;
use crate::models::AnalysisResult;

/// Results screen: terminal task of the flow. Leaving it is a reset.
pub struct ReportTask;

#[async_trait]
impl Task for ReportTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let result: AnalysisResult = context
            .get(session_keys::ANALYSIS_RESULT)
            .await
            .ok_or_else(|| FlowError::ContextError("Analysis result not found".to_string()))?;

        let (response, status) = match &result {
            AnalysisResult::Success(report) => (
                format!(
                    "Predicted blood group {} for {} (report {})",
                    report.predicted_blood_group,
                    report.patient_details.full_name.trim(),
                    report.report_id
                ),
                "Report ready",
            ),
            AnalysisResult::Failure { error } => (error.clone(), "Report failed"),
        };

        info!(task_id = %self.id(), detected = result.detected(), "{}", status);

        Ok(TaskResult::new_with_status(
            Some(response),
            NextAction::End,
            Some(status.to_string()),
        ))
    }
}
