//! Model catalog
//!
//! Most providers have a short fixed list of supported models. OpenRouter and
//! DeepSeek are listed from the public OpenRouter model index instead.

use crate::error::ParleyError;
use crate::providers::{ModelInfo, ProviderKind};
use reqwest::Client;
use serde::Deserialize;

/// Public OpenRouter model index
pub const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";

#[derive(Debug, Deserialize)]
struct OpenRouterModels {
    #[serde(default)]
    data: Vec<OpenRouterModel>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context_length: Option<usize>,
    #[serde(default)]
    pricing: Option<serde_json::Value>,
}

impl From<OpenRouterModel> for ModelInfo {
    fn from(m: OpenRouterModel) -> Self {
        ModelInfo {
            name: m.name.unwrap_or_else(|| m.id.clone()),
            id: m.id,
            description: m.description,
            context_window: m.context_length.unwrap_or(0),
            pricing: m.pricing,
        }
    }
}

/// Fixed model list for providers that have one
pub fn static_models(kind: ProviderKind) -> Option<Vec<ModelInfo>> {
    let models = match kind {
        ProviderKind::OpenAI => vec![
            ModelInfo::new("gpt-4o-mini-2024-07-18", "GPT-4o Mini", 128_000),
            ModelInfo::new("gpt-4o", "GPT-4o", 128_000),
            ModelInfo::new("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385),
        ],
        ProviderKind::Anthropic => vec![
            ModelInfo::new("claude-3-haiku-20240307", "Claude 3 Haiku", 200_000),
            ModelInfo::new("claude-3-sonnet-20240229", "Claude 3 Sonnet", 200_000),
            ModelInfo::new("claude-3-opus-20240229", "Claude 3 Opus", 200_000),
        ],
        ProviderKind::Google => vec![
            ModelInfo::new("models/gemini-pro", "Gemini Pro", 32_768),
            ModelInfo::new("models/gemini-1.5-pro-latest", "Gemini 1.5 Pro", 1_000_000),
        ],
        ProviderKind::Groq => vec![
            ModelInfo::new("llama3-8b-8192", "LLaMA3 8B", 8_192),
            ModelInfo::new("llama3-70b-8192", "LLaMA3 70B", 8_192),
            ModelInfo::new("mixtral-8x7b-32768", "Mixtral 8x7B", 32_768),
        ],
        ProviderKind::Mistral => vec![
            ModelInfo::new("open-mistral-7b", "Mistral 7B", 32_768),
            ModelInfo::new("open-mixtral-8x7b", "Mixtral 8x7B", 32_768),
            ModelInfo::new("mistral-large-latest", "Mistral Large", 32_768),
        ],
        ProviderKind::OpenRouter | ProviderKind::DeepSeek => return None,
    };
    Some(models)
}

/// Lists the models a provider offers
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    client: Client,
    openrouter_url: String,
}

impl ModelCatalog {
    pub fn new(client: Client) -> Self {
        Self::with_openrouter_url(client, OPENROUTER_MODELS_URL)
    }

    pub fn with_openrouter_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            openrouter_url: url.into(),
        }
    }

    /// Models for `kind`
    ///
    /// A failed remote listing is logged and yields an empty list.
    pub async fn models(&self, kind: ProviderKind) -> Vec<ModelInfo> {
        if let Some(models) = static_models(kind) {
            return models;
        }

        let listed = match self.fetch_openrouter().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!("Failed to fetch models for {}: {}", kind, e);
                return Vec::new();
            }
        };

        match kind {
            ProviderKind::DeepSeek => listed
                .into_iter()
                .filter(|m| m.id.contains("deepseek"))
                .collect(),
            _ => listed,
        }
    }

    async fn fetch_openrouter(&self) -> crate::error::Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(&self.openrouter_url)
            .send()
            .await
            .map_err(ParleyError::from)?
            .error_for_status()
            .map_err(ParleyError::from)?;
        let body: OpenRouterModels = response.json().await.map_err(ParleyError::from)?;
        Ok(body.data.into_iter().map(ModelInfo::from).collect())
    }
}
