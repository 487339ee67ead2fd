use async_trait::async_trait;
use dgp_service::capture::{ScanTiming, encode_uploaded_file, generate_synthetic_capture};
use dgp_service::gateway::{AnalysisGateway, GatewayError, ModelReport};
use dgp_service::{
    ANALYSIS_FAILURE_MESSAGE, AnalysisResult, BloodProbability, CapturedImage, Gender,
    PatientDetails, Phase, ScanState, ScanWorkflow, WorkflowError, WorkflowSettings,
    WorkflowSnapshot,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Answers after `delay` with a fixed O+ report, counting every call
struct StubGateway {
    delay: Duration,
    succeed: bool,
    calls: AtomicUsize,
}

impl StubGateway {
    fn ok(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            succeed: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(10),
            succeed: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisGateway for StubGateway {
    async fn request_report(
        &self,
        image: &CapturedImage,
        _patient: &PatientDetails,
    ) -> Result<ModelReport, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;

        if !self.succeed {
            return Err(GatewayError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }
        assert!(!image.is_empty());

        Ok(ModelReport {
            detected: true,
            predicted_blood_group: "O+".to_string(),
            report_id: "DGP-001".to_string(),
            fingerprint_type: None,
            confidence_score: Some(91.0),
            reasoning: Some("Dense loop ridges".to_string()),
            probabilities: Some(vec![
                BloodProbability {
                    group: "O+".to_string(),
                    percentage: 60.0,
                },
                BloodProbability {
                    group: "A+".to_string(),
                    percentage: 40.0,
                },
            ]),
        })
    }
}

fn jane_doe() -> PatientDetails {
    PatientDetails {
        full_name: "Jane Doe".to_string(),
        father_name: String::new(),
        age: "30".to_string(),
        gender: Gender::Female,
        contact_number: "555-1111".to_string(),
    }
}

async fn wait_for_phase(workflow: &ScanWorkflow, id: &str, phase: Phase) -> WorkflowSnapshot {
    loop {
        let snapshot = workflow.snapshot(id).await.unwrap();
        if snapshot.phase == phase {
            return snapshot;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

async fn scanning_session(workflow: &ScanWorkflow) -> String {
    let id = workflow.start_session().await.unwrap();
    let snapshot = workflow.submit_patient(&id, jane_doe()).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Scanning);
    id
}

#[tokio::test(start_paused = true)]
async fn held_scan_produces_a_paced_report() {
    let gateway = StubGateway::ok(Duration::from_millis(10));
    let workflow = ScanWorkflow::new(gateway.clone(), WorkflowSettings::default());
    let id = scanning_session(&workflow).await;

    let pressed = Instant::now();
    let snapshot = workflow.press(&id).await.unwrap();
    assert_eq!(snapshot.scan.state, ScanState::Scanning);

    sleep(Duration::from_millis(1010)).await;
    let midway = workflow.snapshot(&id).await.unwrap();
    assert_eq!(midway.phase, Phase::Scanning);
    assert_eq!(midway.scan.progress, 40);

    let hold = ScanTiming::default().hold_duration();
    wait_for_phase(&workflow, &id, Phase::Analyzing).await;
    assert!(pressed.elapsed() >= hold);

    // full hold, then at least the floor on the analyzing screen
    let results = wait_for_phase(&workflow, &id, Phase::Results).await;
    assert!(pressed.elapsed() >= hold + WorkflowSettings::default().analysis_floor);
    assert!(results.analysis_started_at.is_some());
    assert_eq!(gateway.calls(), 1);

    let report = results
        .analysis_result
        .as_ref()
        .and_then(AnalysisResult::report)
        .unwrap();
    assert_eq!(report.predicted_blood_group, "O+");
    assert_eq!(report.report_id, "DGP-001");
    assert_eq!(report.confidence_score, Some(91.0));
    assert_eq!(report.probabilities.as_ref().map(Vec::len), Some(2));
    assert_eq!(report.patient_details.full_name, "Jane Doe");
    assert_eq!(results.status_message.as_deref(), Some("Report ready"));
}

#[tokio::test(start_paused = true)]
async fn failing_model_ends_on_the_failure_report() {
    let workflow = ScanWorkflow::new(StubGateway::failing(), WorkflowSettings::default());
    let id = scanning_session(&workflow).await;

    workflow
        .submit_capture(&id, generate_synthetic_capture())
        .await
        .unwrap();
    let results = wait_for_phase(&workflow, &id, Phase::Results).await;

    let result = results.analysis_result.unwrap();
    assert!(!result.detected());
    assert_eq!(result.error(), Some(ANALYSIS_FAILURE_MESSAGE));
    assert_eq!(results.patient_details, Some(jane_doe()));
}

#[tokio::test(start_paused = true)]
async fn early_release_never_captures() {
    let gateway = StubGateway::ok(Duration::from_millis(10));
    let workflow = ScanWorkflow::new(gateway.clone(), WorkflowSettings::default());
    let id = scanning_session(&workflow).await;

    workflow.press(&id).await.unwrap();
    sleep(Duration::from_millis(2000)).await;
    let released = workflow.release(&id).await.unwrap();
    assert_eq!(released.scan.state, ScanState::Idle);
    assert_eq!(released.scan.progress, 0);

    sleep(Duration::from_secs(10)).await;
    let snapshot = workflow.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Scanning);
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn pressing_again_restarts_the_hold() {
    let gateway = StubGateway::ok(Duration::from_millis(10));
    let workflow = ScanWorkflow::new(gateway.clone(), WorkflowSettings::default());
    let id = scanning_session(&workflow).await;

    workflow.press(&id).await.unwrap();
    sleep(Duration::from_millis(2000)).await;
    let repressed = Instant::now();
    let snapshot = workflow.press(&id).await.unwrap();
    assert_eq!(snapshot.scan.progress, 0);

    wait_for_phase(&workflow, &id, Phase::Analyzing).await;
    assert!(repressed.elapsed() >= ScanTiming::default().hold_duration());

    wait_for_phase(&workflow, &id, Phase::Results).await;
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_starts_a_clean_patient_and_is_idempotent() {
    let workflow = ScanWorkflow::new(
        StubGateway::ok(Duration::from_millis(10)),
        WorkflowSettings::default(),
    );
    let id = scanning_session(&workflow).await;
    workflow
        .submit_capture(&id, generate_synthetic_capture())
        .await
        .unwrap();
    wait_for_phase(&workflow, &id, Phase::Results).await;

    let first = workflow.reset(&id).await.unwrap();
    let second = workflow.reset(&id).await.unwrap();
    for snapshot in [first, second] {
        assert_eq!(snapshot.phase, Phase::Form);
        assert!(snapshot.patient_details.is_none());
        assert!(snapshot.analysis_result.is_none());
    }

    // the same session takes the next patient
    let mut next = jane_doe();
    next.full_name = "John Roe".to_string();
    let snapshot = workflow.submit_patient(&id, next.clone()).await.unwrap();
    assert_eq!(snapshot.patient_details, Some(next));
}

#[tokio::test]
async fn out_of_order_actions_are_rejected() {
    let workflow = ScanWorkflow::new(
        StubGateway::ok(Duration::from_millis(10)),
        WorkflowSettings::default(),
    );
    let id = workflow.start_session().await.unwrap();

    for result in [
        workflow.press(&id).await,
        workflow.back(&id).await,
        workflow.upload(&id, vec![1, 2, 3]).await,
    ] {
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidTransition { phase: Phase::Form, .. })
        ));
    }

    let mut nameless = jane_doe();
    nameless.full_name.clear();
    assert!(matches!(
        workflow.submit_patient(&id, nameless).await,
        Err(WorkflowError::InvalidPatient { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn sessions_do_not_share_state() {
    let workflow = ScanWorkflow::new(
        StubGateway::ok(Duration::from_millis(10)),
        WorkflowSettings::default(),
    );
    let scanned = scanning_session(&workflow).await;
    let idle = workflow.start_session().await.unwrap();

    workflow
        .submit_capture(&scanned, generate_synthetic_capture())
        .await
        .unwrap();
    wait_for_phase(&workflow, &scanned, Phase::Results).await;

    let other = workflow.snapshot(&idle).await.unwrap();
    assert_eq!(other.phase, Phase::Form);
    assert!(other.patient_details.is_none());
    assert!(other.analysis_result.is_none());
}

#[tokio::test]
async fn scan_file_from_disk_is_accepted() {
    let path = std::env::temp_dir().join(format!("dgp-scan-{}.png", std::process::id()));
    tokio::fs::write(&path, generate_synthetic_capture().bytes())
        .await
        .unwrap();

    let image = encode_uploaded_file(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();
    assert!(!image.is_empty());

    let workflow = ScanWorkflow::new(
        StubGateway::ok(Duration::from_millis(10)),
        WorkflowSettings {
            analysis_floor: Duration::ZERO,
            ..WorkflowSettings::default()
        },
    );
    let id = scanning_session(&workflow).await;
    let snapshot = workflow.submit_capture(&id, image).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Analyzing);

    let results = wait_for_phase(&workflow, &id, Phase::Results).await;
    assert!(results.analysis_result.unwrap().detected());
}
