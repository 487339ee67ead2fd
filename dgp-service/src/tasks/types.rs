/// Context keys shared by the workflow tasks and the workflow facade
pub mod session_keys {
    pub const PATIENT_DETAILS: &str = "patient_details";
    /// Present only between capture and the start of analysis
    pub const CAPTURED_IMAGE: &str = "captured_image";
    pub const ANALYSIS_RESULT: &str = "analysis_result";
    pub const ANALYSIS_STARTED_AT: &str = "analysis_started_at";
    /// Set by the "back" action, consumed by the scan task
    pub const NAVIGATE_BACK: &str = "navigate_back";
}
