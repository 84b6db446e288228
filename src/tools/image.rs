//! `createImage`: image generation through a Replicate prediction

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{ParleyError, Result};
use crate::tools::{string_arg, ToolExecutor, ToolResult};

pub const DEFAULT_REPLICATE_URL: &str = "https://api.replicate.com";

/// Model version every prediction runs
pub const MODEL_VERSION: &str = "8a87425c05053733140268571477134316d3f2730623630386454d6342a35339";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ImageTool {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    max_wait: Duration,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    urls: PredictionUrls,
}

#[derive(Debug, Default, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        self.status == "succeeded" || self.status == "failed"
    }
}

fn detail(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

impl ImageTool {
    /// `max_wait` bounds how long a prediction is polled for
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_token: String,
        max_wait: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            api_token,
            max_wait,
        }
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.api_token)
    }

    async fn create(&self, prompt: &str) -> Result<Prediction> {
        let response = self
            .client
            .post(format!("{}/v1/predictions", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&json!({
                "version": MODEL_VERSION,
                "input": {"prompt": prompt},
            }))
            .send()
            .await
            .map_err(ParleyError::from)?;

        if !response.status().is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(ParleyError::ToolExecution(format!(
                "Replicate API error: {}",
                detail(&body["detail"])
            ))
            .into());
        }

        Ok(response.json().await.map_err(ParleyError::from)?)
    }

    async fn poll(&self, mut prediction: Prediction) -> Result<Prediction> {
        let deadline = tokio::time::Instant::now() + self.max_wait;
        while !prediction.is_terminal() {
            if tokio::time::Instant::now() >= deadline {
                return Err(ParleyError::ToolExecution(format!(
                    "Replicate prediction did not finish within {}s (last status: {})",
                    self.max_wait.as_secs(),
                    prediction.status
                ))
                .into());
            }
            let url = prediction.urls.get.clone().ok_or_else(|| {
                ParleyError::ToolExecution("Replicate prediction has no status URL".to_string())
            })?;

            tokio::time::sleep(POLL_INTERVAL).await;
            tracing::debug!(status = %prediction.status, "Polling Replicate prediction");
            prediction = self
                .client
                .get(url)
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .send()
                .await
                .map_err(ParleyError::from)?
                .json()
                .await
                .map_err(ParleyError::from)?;
        }
        Ok(prediction)
    }
}

#[async_trait]
impl ToolExecutor for ImageTool {
    fn tool_definition(&self) -> Value {
        json!({
            "name": "createImage",
            "description": "Create an image based on a prompt",
            "parameters": {
                "type": "object",
                "properties": {"prompt": {"type": "string"}},
                "required": ["prompt"]
            }
        })
    }

    fn pending(&self, _args: &Value) -> Option<String> {
        Some("Generating image...".to_string())
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let prompt = string_arg(&args, "prompt")?;
        let prediction = self.poll(self.create(prompt).await?).await?;

        if prediction.status == "failed" {
            return Err(ParleyError::ToolExecution(format!(
                "Replicate prediction failed: {}",
                detail(&prediction.error)
            ))
            .into());
        }
        Ok(ToolResult::json(prediction.output))
    }
}
