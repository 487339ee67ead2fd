use async_trait::async_trait;
use chrono::Utc;
use dgp_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use super::session_keys;
use crate::gateway::AnalysisGateway;
use crate::models::{CapturedImage, PatientDetails};

/// Analyzing screen: sends the capture to the gateway and holds the session
/// here for at least `floor`, however fast the gateway answers
pub struct AnalysisTask {
    gateway: Arc<dyn AnalysisGateway>,
    floor: Duration,
}

impl AnalysisTask {
    pub const DEFAULT_FLOOR: Duration = Duration::from_millis(3000);

    pub fn new(gateway: Arc<dyn AnalysisGateway>, floor: Duration) -> Self {
        Self { gateway, floor }
    }
}

#[async_trait]
impl Task for AnalysisTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let patient: PatientDetails = context
            .get(session_keys::PATIENT_DETAILS)
            .await
            .ok_or_else(|| FlowError::ContextError("Patient details not found".to_string()))?;

        // the frame is used once and never kept
        let image: CapturedImage = context
            .take(session_keys::CAPTURED_IMAGE)
            .await
            .ok_or_else(|| FlowError::ContextError("Captured image not found".to_string()))?;

        context.set(session_keys::ANALYSIS_STARTED_AT, Utc::now()).await?;
        let started = Instant::now();

        let result = self.gateway.analyze(&image, &patient).await;
        drop(image);

        let elapsed = started.elapsed();
        if let Some(remaining) = self.floor.checked_sub(elapsed) {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                remaining_ms = remaining.as_millis() as u64,
                "Gateway answered early, holding the analysis screen"
            );
            sleep(remaining).await;
        }

        info!(
            task_id = %self.id(),
            detected = result.detected(),
            "Analysis finished"
        );
        context.set(session_keys::ANALYSIS_RESULT, &result).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some("Analysis complete".to_string()),
        ))
    }
}
