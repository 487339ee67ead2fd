use anyhow::{Context as _, anyhow};
use std::str::FromStr;
use std::time::Duration;

use crate::capture::ScanTiming;
use crate::gateway::OpenRouterConfig;
use crate::service::DEFAULT_MAX_UPLOAD_BYTES;
use crate::workflow::WorkflowSettings;

const DEFAULT_PORT: u16 = 3000;

/// Startup configuration, read once from the environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Body cap on the scan upload route, in bytes
    pub max_upload_bytes: usize,
    pub openrouter: OpenRouterConfig,
    pub workflow: WorkflowSettings,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] over an arbitrary key source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY environment variable is required"))?;

        let mut openrouter = OpenRouterConfig::new(api_key);
        if let Some(base_url) = lookup("OPENROUTER_BASE_URL") {
            openrouter.base_url = base_url;
        }
        if let Some(model) = lookup("DGP_MODEL") {
            openrouter.model = model;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DGP_REQUEST_TIMEOUT_SECS")? {
            openrouter.timeout = Duration::from_secs(secs);
        }

        let mut workflow = WorkflowSettings::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "DGP_ANALYSIS_FLOOR_MS")? {
            workflow.analysis_floor = Duration::from_millis(ms);
        }
        let defaults = ScanTiming::default();
        workflow.scan_timing = ScanTiming {
            tick: parse_var::<u64>(&lookup, "DGP_SCAN_TICK_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick),
            step: parse_var::<u8>(&lookup, "DGP_SCAN_STEP")?.unwrap_or(defaults.step),
        };
        if workflow.scan_timing.tick.is_zero() {
            return Err(anyhow!("DGP_SCAN_TICK_MS must be greater than zero"));
        }
        if !(1..=100).contains(&workflow.scan_timing.step) {
            return Err(anyhow!("DGP_SCAN_STEP must be between 1 and 100"));
        }

        let port = parse_var::<u16>(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT);
        let max_upload_bytes = parse_var::<usize>(&lookup, "DGP_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(anyhow!("DGP_MAX_UPLOAD_BYTES must be greater than zero"));
        }

        Ok(Self {
            port,
            max_upload_bytes,
            openrouter,
            workflow,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value: {raw:?}"))
        })
        .transpose()
}
