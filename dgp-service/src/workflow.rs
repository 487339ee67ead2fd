//! The scan-to-report state machine.
//!
//! Each session walks `Form -> Scanning -> Analyzing -> Results` as tasks of
//! one [`Graph`]. [`ScanWorkflow`] is the only thing that mutates sessions:
//! every user action goes through it, is checked against the current phase
//! and runs under a single transition lock.

use dashmap::DashMap;
use dgp_flow::{
    FlowError, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capture::{CaptureController, CaptureSink, ScanTiming, encode_uploaded_bytes};
use crate::gateway::AnalysisGateway;
use crate::models::{
    AnalysisResult, CapturedImage, PatientDetails, Phase, ScanStatus, WorkflowSnapshot,
};
use crate::tasks::{AnalysisTask, PatientIntakeTask, ReportTask, ScanTask, phase_of, session_keys};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("cannot {action} while the session is in the {phase:?} phase")]
    InvalidTransition { phase: Phase, action: &'static str },

    #[error(
        "invalid patient details (missing: [{}], malformed: [{}])",
        missing.join(", "),
        malformed.join(", ")
    )]
    InvalidPatient {
        missing: Vec<&'static str>,
        malformed: Vec<&'static str>,
    },

    #[error("capture rejected: {0}")]
    Capture(String),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Minimum time a session spends on the Analyzing screen
    pub analysis_floor: Duration,
    pub scan_timing: ScanTiming,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            analysis_floor: AnalysisTask::DEFAULT_FLOOR,
            scan_timing: ScanTiming::default(),
        }
    }
}

pub fn build_scan_workflow(gateway: Arc<dyn AnalysisGateway>, analysis_floor: Duration) -> Graph {
    let intake_task = Arc::new(PatientIntakeTask);
    let intake_id = intake_task.id().to_string();

    let scan_task = Arc::new(ScanTask);
    let scan_id = scan_task.id().to_string();

    let analysis_task = Arc::new(AnalysisTask::new(gateway, analysis_floor));
    let analysis_id = analysis_task.id().to_string();

    let report_task = Arc::new(ReportTask);
    let report_id = report_task.id().to_string();

    GraphBuilder::new("dgp_scan_workflow")
        .add_task(intake_task)
        .add_task(scan_task)
        .add_task(analysis_task)
        .add_task(report_task)
        .add_edge(&intake_id, &scan_id)
        .add_edge(&scan_id, &analysis_id)
        .add_edge(&analysis_id, &report_id)
        .build()
}

/// Cheap to clone; clones drive the same sessions
#[derive(Clone)]
pub struct ScanWorkflow {
    inner: Arc<WorkflowInner>,
}

struct WorkflowInner {
    runner: FlowRunner,
    settings: WorkflowSettings,
    /// One capture controller per session currently on the Scanning screen
    controllers: DashMap<String, CaptureController>,
    transitions: Mutex<()>,
}

impl ScanWorkflow {
    pub fn new(gateway: Arc<dyn AnalysisGateway>, settings: WorkflowSettings) -> Self {
        let graph = Arc::new(build_scan_workflow(gateway, settings.analysis_floor));
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        Self {
            inner: Arc::new(WorkflowInner {
                runner: FlowRunner::new(graph, storage),
                settings,
                controllers: DashMap::new(),
                transitions: Mutex::new(()),
            }),
        }
    }

    /// Open a new session on the Form screen
    pub async fn start_session(&self) -> WorkflowResult<String> {
        let start = self
            .inner
            .runner
            .graph()
            .start_task_id()
            .ok_or(FlowError::MissingStartTask)?;
        let session_id = Uuid::new_v4().to_string();

        self.storage()
            .save(Session::new_from_task(session_id.clone(), start))
            .await?;
        info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    pub async fn snapshot(&self, session_id: &str) -> WorkflowResult<WorkflowSnapshot> {
        let session = self.load(session_id).await?;
        let phase = session_phase(&session)?;
        let scan = self
            .inner
            .controllers
            .get(session_id)
            .map(|controller| controller.status())
            .unwrap_or(ScanStatus::IDLE);

        Ok(WorkflowSnapshot {
            session_id: session.id.clone(),
            phase,
            patient_details: session.context.get(session_keys::PATIENT_DETAILS).await,
            analysis_result: session.context.get(session_keys::ANALYSIS_RESULT).await,
            scan,
            status_message: session.status_message.clone(),
            analysis_started_at: session.context.get(session_keys::ANALYSIS_STARTED_AT).await,
        })
    }

    /// Form -> Scanning
    pub async fn submit_patient(
        &self,
        session_id: &str,
        patient: PatientDetails,
    ) -> WorkflowResult<WorkflowSnapshot> {
        if !patient.is_valid() {
            return Err(WorkflowError::InvalidPatient {
                missing: patient.missing_fields(),
                malformed: patient.malformed_fields(),
            });
        }

        {
            let _guard = self.inner.transitions.lock().await;
            let session = self
                .expect_phase(session_id, Phase::Form, "submit patient details")
                .await?;
            session
                .context
                .set(session_keys::PATIENT_DETAILS, &patient)
                .await?;
            self.inner.runner.run(session_id).await?;
        }

        info!(session_id = %session_id, "Patient details submitted");
        self.snapshot(session_id).await
    }

    /// Press the sensor pad. Pressing again restarts the hold.
    pub async fn press(&self, session_id: &str) -> WorkflowResult<WorkflowSnapshot> {
        {
            let _guard = self.inner.transitions.lock().await;
            self.expect_phase(session_id, Phase::Scanning, "start a scan").await?;

            let controller = self
                .inner
                .controllers
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    let sink = WorkflowCaptureSink {
                        workflow: Arc::downgrade(&self.inner),
                        session_id: session_id.to_string(),
                    };
                    CaptureController::new(self.inner.settings.scan_timing, Arc::new(sink))
                });
            controller.press();
        }
        self.snapshot(session_id).await
    }

    /// Lift the finger. Harmless when no hold is in progress.
    pub async fn release(&self, session_id: &str) -> WorkflowResult<WorkflowSnapshot> {
        if let Some(controller) = self.inner.controllers.get(session_id) {
            controller.release();
        }
        self.snapshot(session_id).await
    }

    /// Upload path: skips the hold and goes straight to analysis
    pub async fn upload(&self, session_id: &str, bytes: Vec<u8>) -> WorkflowResult<WorkflowSnapshot> {
        self.expect_phase(session_id, Phase::Scanning, "upload a scan").await?;
        let image = encode_uploaded_bytes(bytes)
            .await
            .map_err(|e| WorkflowError::Capture(e.to_string()))?;
        self.submit_capture(session_id, image).await
    }

    /// Scanning -> Analyzing. The analysis runs in the background and moves the
    /// session to Results on its own.
    pub async fn submit_capture(
        &self,
        session_id: &str,
        image: CapturedImage,
    ) -> WorkflowResult<WorkflowSnapshot> {
        {
            let _guard = self.inner.transitions.lock().await;
            let session = self
                .expect_phase(session_id, Phase::Scanning, "submit a capture")
                .await?;
            self.inner.controllers.remove(session_id);

            session
                .context
                .set(session_keys::CAPTURED_IMAGE, &image)
                .await?;
            self.inner.runner.run(session_id).await?;
        }
        let accepted = Instant::now();

        info!(
            session_id = %session_id,
            image_bytes = image.bytes().len(),
            "Capture accepted, analysis started"
        );
        let inner = Arc::clone(&self.inner);
        let id = session_id.to_string();
        tokio::spawn(async move { run_analysis(inner, id, accepted).await });

        self.snapshot(session_id).await
    }

    /// Scanning -> Form. Patient details are kept so the form comes back filled in.
    pub async fn back(&self, session_id: &str) -> WorkflowResult<WorkflowSnapshot> {
        {
            let _guard = self.inner.transitions.lock().await;
            let session = self.expect_phase(session_id, Phase::Scanning, "go back").await?;
            self.inner.controllers.remove(session_id);

            session.context.set(session_keys::NAVIGATE_BACK, true).await?;
            self.inner.runner.run(session_id).await?;
        }
        info!(session_id = %session_id, "Returned to patient details");
        self.snapshot(session_id).await
    }

    /// New patient: back to an empty Form. Not possible while an analysis is
    /// in flight; safe to repeat.
    pub async fn reset(&self, session_id: &str) -> WorkflowResult<WorkflowSnapshot> {
        {
            let _guard = self.inner.transitions.lock().await;
            let mut session = self.load(session_id).await?;
            let phase = session_phase(&session)?;
            if phase == Phase::Analyzing {
                return Err(WorkflowError::InvalidTransition {
                    phase,
                    action: "reset",
                });
            }
            self.inner.controllers.remove(session_id);

            self.inner.runner.graph().restart_session(&mut session).await?;
            self.storage().save(session).await?;
        }
        info!(session_id = %session_id, "Session reset for a new patient");
        self.snapshot(session_id).await
    }

    fn storage(&self) -> &Arc<dyn SessionStorage> {
        self.inner.runner.storage()
    }

    async fn load(&self, session_id: &str) -> WorkflowResult<Session> {
        self.storage()
            .get(session_id)
            .await?
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))
    }

    async fn expect_phase(
        &self,
        session_id: &str,
        expected: Phase,
        action: &'static str,
    ) -> WorkflowResult<Session> {
        let session = self.load(session_id).await?;
        let phase = session_phase(&session)?;
        if phase != expected {
            warn!(session_id = %session_id, ?phase, action, "Rejected out-of-phase action");
            return Err(WorkflowError::InvalidTransition { phase, action });
        }
        Ok(session)
    }
}

fn session_phase(session: &Session) -> WorkflowResult<Phase> {
    phase_of(&session.current_task_id)
        .ok_or_else(|| FlowError::TaskNotFound(session.current_task_id.clone()).into())
}

/// Drives the Analyzing step to completion. Whatever goes wrong, the session
/// still lands on Results with a failure result, and never before the
/// analysis floor has passed since `accepted`.
async fn run_analysis(inner: Arc<WorkflowInner>, session_id: String, accepted: Instant) {
    match inner.runner.run(&session_id).await {
        Ok(result) => {
            info!(
                session_id = %session_id,
                status = ?result.status,
                response = ?result.response,
                "Analysis workflow finished"
            );
        }
        Err(e) => {
            error!(session_id = %session_id, "Analysis workflow failed: {}", e);
            let floor = inner.settings.analysis_floor;
            if let Some(remaining) = floor.checked_sub(accepted.elapsed()) {
                sleep(remaining).await;
            }
            if let Err(e) = settle_as_failure(&inner, &session_id).await {
                error!(session_id = %session_id, "Could not record failed analysis: {}", e);
            }
        }
    }
}

async fn settle_as_failure(inner: &WorkflowInner, session_id: &str) -> dgp_flow::Result<()> {
    let storage = inner.runner.storage();
    let mut session = storage
        .get(session_id)
        .await?
        .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

    session.context.remove(session_keys::CAPTURED_IMAGE).await;
    session
        .context
        .set(session_keys::ANALYSIS_RESULT, AnalysisResult::failure())
        .await?;
    session.current_task_id = std::any::type_name::<ReportTask>().to_string();
    session.status_message = Some("Report failed".to_string());
    storage.save(session).await
}

/// Routes a finished hold back into the workflow
struct WorkflowCaptureSink {
    workflow: Weak<WorkflowInner>,
    session_id: String,
}

impl CaptureSink for WorkflowCaptureSink {
    fn on_capture(&self, image: CapturedImage) {
        let Some(inner) = self.workflow.upgrade() else {
            return;
        };
        let workflow = ScanWorkflow { inner };
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = workflow.submit_capture(&session_id, image).await {
                warn!(session_id = %session_id, "Dropping capture: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, ModelReport};
    use crate::models::Gender;
    use async_trait::async_trait;

    struct OfflineGateway;

    #[async_trait]
    impl AnalysisGateway for OfflineGateway {
        async fn request_report(
            &self,
            _image: &CapturedImage,
            _patient: &PatientDetails,
        ) -> Result<ModelReport, GatewayError> {
            Err(GatewayError::Unavailable("offline".to_string()))
        }
    }

    fn workflow() -> ScanWorkflow {
        ScanWorkflow::new(Arc::new(OfflineGateway), WorkflowSettings::default())
    }

    fn patient() -> PatientDetails {
        PatientDetails {
            full_name: "Jane Doe".to_string(),
            father_name: String::new(),
            age: "30".to_string(),
            gender: Gender::Female,
            contact_number: "555-1111".to_string(),
        }
    }

    async fn wait_for(workflow: &ScanWorkflow, id: &str, phase: Phase) -> WorkflowSnapshot {
        loop {
            let snapshot = workflow.snapshot(id).await.unwrap();
            if snapshot.phase == phase {
                return snapshot;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn new_session_starts_on_an_empty_form() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();

        let snapshot = workflow.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Form);
        assert!(snapshot.patient_details.is_none());
        assert!(snapshot.analysis_result.is_none());
        assert_eq!(snapshot.scan, ScanStatus::IDLE);
    }

    #[tokio::test]
    async fn incomplete_patient_is_rejected_and_form_stays() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        let mut incomplete = patient();
        incomplete.age = " ".to_string();

        let err = workflow.submit_patient(&id, incomplete).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidPatient { ref missing, ref malformed }
                if missing == &["age"] && malformed.is_empty()
        ));

        let snapshot = workflow.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Form);
        assert!(snapshot.patient_details.is_none());
    }

    #[tokio::test]
    async fn non_numeric_age_is_rejected_as_malformed() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        let mut patient = patient();
        patient.age = "thirty".to_string();

        let err = workflow.submit_patient(&id, patient).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidPatient { ref missing, ref malformed }
                if missing.is_empty() && malformed == &["age"]
        ));
        assert_eq!(workflow.snapshot(&id).await.unwrap().phase, Phase::Form);
    }

    #[tokio::test]
    async fn submitting_twice_is_an_invalid_transition() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();

        let snapshot = workflow.submit_patient(&id, patient()).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Scanning);
        assert_eq!(snapshot.patient_details, Some(patient()));

        let err = workflow.submit_patient(&id, patient()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition { phase: Phase::Scanning, .. }
        ));
    }

    #[tokio::test]
    async fn capture_outside_scanning_is_rejected() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();

        let err = workflow
            .submit_capture(&id, CapturedImage::from_png(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { phase: Phase::Form, .. }));
        assert!(matches!(
            workflow.press(&id).await,
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn back_keeps_the_patient_for_the_form() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        workflow.submit_patient(&id, patient()).await.unwrap();

        let snapshot = workflow.back(&id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Form);
        assert_eq!(snapshot.patient_details, Some(patient()));

        let mut corrected = patient();
        corrected.full_name = "Jane Q. Doe".to_string();
        let snapshot = workflow.submit_patient(&id, corrected.clone()).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Scanning);
        assert_eq!(snapshot.patient_details, Some(corrected));
    }

    #[tokio::test(start_paused = true)]
    async fn back_cancels_a_hold_in_progress() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        workflow.submit_patient(&id, patient()).await.unwrap();

        workflow.press(&id).await.unwrap();
        sleep(Duration::from_millis(1000)).await;
        workflow.back(&id).await.unwrap();

        sleep(Duration::from_secs(5)).await;
        let snapshot = workflow.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Form);
        assert_eq!(snapshot.scan, ScanStatus::IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn analysis_cannot_be_reset_or_doubled() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        workflow.submit_patient(&id, patient()).await.unwrap();

        let snapshot = workflow
            .submit_capture(&id, CapturedImage::from_png(vec![1]))
            .await
            .unwrap();
        assert_eq!(snapshot.phase, Phase::Analyzing);

        assert!(matches!(
            workflow.reset(&id).await,
            Err(WorkflowError::InvalidTransition { phase: Phase::Analyzing, .. })
        ));
        assert!(matches!(
            workflow
                .submit_capture(&id, CapturedImage::from_png(vec![2]))
                .await,
            Err(WorkflowError::InvalidTransition { phase: Phase::Analyzing, .. })
        ));

        let results = wait_for(&workflow, &id, Phase::Results).await;
        assert_eq!(results.analysis_result, Some(AnalysisResult::failure()));
        assert!(results.analysis_started_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_idempotent_and_clears_everything() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        workflow.submit_patient(&id, patient()).await.unwrap();
        workflow
            .submit_capture(&id, CapturedImage::from_png(vec![1]))
            .await
            .unwrap();
        wait_for(&workflow, &id, Phase::Results).await;

        for _ in 0..2 {
            let snapshot = workflow.reset(&id).await.unwrap();
            assert_eq!(snapshot.phase, Phase::Form);
            assert!(snapshot.patient_details.is_none());
            assert!(snapshot.analysis_result.is_none());
            assert!(snapshot.status_message.is_none());
            assert!(snapshot.analysis_started_at.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_patient_still_lands_on_results_after_the_floor() {
        let workflow = workflow();
        let id = workflow.start_session().await.unwrap();
        workflow.submit_patient(&id, patient()).await.unwrap();

        // corrupt the session behind the workflow's back
        let session = workflow.load(&id).await.unwrap();
        session.context.remove(session_keys::PATIENT_DETAILS).await;

        let entered = Instant::now();
        workflow
            .submit_capture(&id, CapturedImage::from_png(vec![1]))
            .await
            .unwrap();
        let results = wait_for(&workflow, &id, Phase::Results).await;

        assert!(entered.elapsed() >= Duration::from_millis(3000));
        assert!(entered.elapsed() < Duration::from_millis(3100));
        assert_eq!(results.analysis_result, Some(AnalysisResult::failure()));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let workflow = workflow();
        assert!(matches!(
            workflow.snapshot("nope").await,
            Err(WorkflowError::SessionNotFound(_))
        ));
        assert!(matches!(
            workflow.reset("nope").await,
            Err(WorkflowError::SessionNotFound(_))
        ));
    }
}
