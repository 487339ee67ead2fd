pub mod capture;
pub mod config;
pub mod gateway;
pub mod models;
pub mod service;
pub mod tasks;
pub mod workflow;

pub use config::ServiceConfig;
pub use service::{AppState, create_app};
pub use workflow::{ScanWorkflow, WorkflowError, WorkflowSettings, build_scan_workflow};
pub use models::*;
