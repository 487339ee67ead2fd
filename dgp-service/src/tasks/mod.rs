pub mod analysis;
pub mod patient_intake;
pub mod report;
pub mod scan;
pub mod types;

pub use analysis::AnalysisTask;
pub use patient_intake::PatientIntakeTask;
pub use report::ReportTask;
pub use scan::ScanTask;
pub use types::session_keys;

use std::any::type_name;

use crate::models::Phase;

/// Screen shown while a session sits on `task_id`
pub fn phase_of(task_id: &str) -> Option<Phase> {
    [
        (type_name::<PatientIntakeTask>(), Phase::Form),
        (type_name::<ScanTask>(), Phase::Scanning),
        (type_name::<AnalysisTask>(), Phase::Analyzing),
        (type_name::<ReportTask>(), Phase::Results),
    ]
    .into_iter()
    .find(|(id, _)| *id == task_id)
    .map(|(_, phase)| phase)
}
