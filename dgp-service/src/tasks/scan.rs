use async_trait::async_trait;
use dgp_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::{PatientIntakeTask, session_keys};

/// Scanning screen: waits for a captured frame, or for the user to go back
/// to the form
pub struct ScanTask;

#[async_trait]
impl Task for ScanTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        if context.remove(session_keys::NAVIGATE_BACK).await.is_some() {
            info!(task_id = %self.id(), "Returning to patient details");
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::GoTo(std::any::type_name::<PatientIntakeTask>().to_string()),
                Some("Back to patient details".to_string()),
            ));
        }

        if context.contains(session_keys::CAPTURED_IMAGE) {
            info!(task_id = %self.id(), "Capture received, queueing analysis");
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::Continue,
                Some("Analyzing dermatoglyphic pattern".to_string()),
            ));
        }

        Ok(TaskResult::new_with_status(
            None,
            NextAction::WaitForInput,
            Some("Hold to scan, or upload a scan file".to_string()),
        ))
    }
}
