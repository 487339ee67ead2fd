use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    AnalysisGateway, GatewayError,
    prompt::build_analysis_prompt,
    schema::{ModelReport, parse_model_report, response_schema},
};
use crate::models::{CapturedImage, PatientDetails};

#[derive(Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenRouterConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://openrouter.ai/api/v1";
    pub const DEFAULT_MODEL: &'static str = "google/gemini-2.5-flash";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Vision model behind an OpenAI-compatible chat-completions endpoint
pub struct OpenRouterGateway {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterGateway {
    pub fn new(config: OpenRouterConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// One user message: the frame as a data URL followed by the instruction
    pub fn build_payload(&self, image: &CapturedImage, patient: &PatientDetails) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": image.data_url() }
                        },
                        {
                            "type": "text",
                            "text": build_analysis_prompt(patient)
                        }
                    ]
                }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "dgp_report",
                    "schema": response_schema()
                }
            }
        })
    }
}

#[async_trait]
impl AnalysisGateway for OpenRouterGateway {
    async fn request_report(
        &self,
        image: &CapturedImage,
        patient: &PatientDetails,
    ) -> Result<ModelReport, GatewayError> {
        info!(
            model = %self.config.model,
            image_bytes = image.bytes().len(),
            "Requesting fingerprint analysis"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.build_payload(image, patient))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = response.json().await?;
        let content = envelope["choices"][0]["message"]["content"]
            .as_str()
            .filter(|content| !content.trim().is_empty())
            .ok_or(GatewayError::EmptyResponse)?;

        debug!("Model answered with {} characters", content.len());
        parse_model_report(content)
    }
}
