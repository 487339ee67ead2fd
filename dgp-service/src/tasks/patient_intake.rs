use async_trait::async_trait;
use dgp_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::session_keys;
use crate::models::PatientDetails;

/// Form screen: holds the session until complete patient details arrive
pub struct PatientIntakeTask;

#[async_trait]
impl Task for PatientIntakeTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(patient) = context
            .get::<PatientDetails>(session_keys::PATIENT_DETAILS)
            .await
        else {
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::WaitForInput,
                Some("Waiting for patient details".to_string()),
            ));
        };

        if !patient.is_valid() {
            let missing = patient.missing_fields();
            let status = if missing.is_empty() {
                format!("Invalid fields: {}", patient.malformed_fields().join(", "))
            } else {
                format!("Missing required fields: {}", missing.join(", "))
            };
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::WaitForInput,
                Some(status),
            ));
        }

        info!(task_id = %self.id(), "Patient registered, moving to biometric acquisition");

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!(
                "Acquire fingerprint data for {}",
                patient.full_name.trim()
            )),
        ))
    }
}
