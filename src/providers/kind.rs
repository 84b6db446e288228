//! Supported LLM providers
//!
//! [`ProviderKind`] is the closed set of backends Parley can talk to. Each
//! variant carries its static descriptor: display name, display colour,
//! default model, API key environment variable and API base URL.

use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};

/// A supported LLM provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Google,
    Groq,
    Mistral,
    OpenRouter,
    DeepSeek,
}

/// Wire protocol family a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    /// OpenAI chat-completions (also Groq, Mistral, OpenRouter, DeepSeek)
    OpenAiCompatible,
    /// Anthropic Messages API
    Anthropic,
    /// Google Gemini `generateContent`
    Gemini,
}

impl ProviderKind {
    /// Every provider, in display order
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::Google,
        ProviderKind::Groq,
        ProviderKind::Mistral,
        ProviderKind::OpenRouter,
        ProviderKind::DeepSeek,
    ];

    /// Provider used when none is selected
    pub const DEFAULT: ProviderKind = ProviderKind::OpenAI;

    /// Canonical display name, also used as the stored `ai_provider` value
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Google => "Google",
            ProviderKind::Groq => "Groq",
            ProviderKind::Mistral => "Mistral",
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::DeepSeek => "DeepSeek",
        }
    }

    /// Brand colour as a `#rrggbb` hex string
    pub fn color(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "#10a37f",
            ProviderKind::Anthropic => "#d97706",
            ProviderKind::Google => "#4285f4",
            ProviderKind::Groq => "#f97316",
            ProviderKind::Mistral => "#7c3aed",
            ProviderKind::OpenRouter => "#059669",
            ProviderKind::DeepSeek => "#dc2626",
        }
    }

    /// Model used when the caller does not pick one
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o-mini-2024-07-18",
            ProviderKind::Anthropic => "claude-3-haiku-20240307",
            ProviderKind::Google => "models/gemini-pro",
            ProviderKind::Groq => "llama3-8b-8192",
            ProviderKind::Mistral => "open-mistral-7b",
            ProviderKind::OpenRouter => "google/gemini-flash-1.5",
            ProviderKind::DeepSeek => "deepseek-chat",
        }
    }

    /// Environment variable consulted when no key is stored
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Google => "GEMINI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Mistral => "https://api.mistral.ai/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
        }
    }

    pub fn api_family(&self) -> ApiFamily {
        match self {
            ProviderKind::Anthropic => ApiFamily::Anthropic,
            ProviderKind::Google => ApiFamily::Gemini,
            _ => ApiFamily::OpenAiCompatible,
        }
    }

    /// Look up a provider by name, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ParleyError::UnknownProvider(s.to_string()))
    }
}

/// What to do with a provider name outside [`ProviderKind::ALL`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownProviderPolicy {
    /// Log a warning and use [`ProviderKind::DEFAULT`]
    #[default]
    FallbackToDefault,
    /// Fail with [`ParleyError::UnknownProvider`]
    Reject,
}

/// Resolve an optional provider name under `policy`
///
/// `None` and blank names select [`ProviderKind::DEFAULT`].
pub fn resolve_provider(name: Option<&str>, policy: UnknownProviderPolicy) -> Result<ProviderKind> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(ProviderKind::DEFAULT);
    };

    match ProviderKind::from_name(name) {
        Some(kind) => Ok(kind),
        None => match policy {
            UnknownProviderPolicy::FallbackToDefault => {
                tracing::warn!(
                    "Unknown provider '{}', falling back to {}",
                    name,
                    ProviderKind::DEFAULT
                );
                Ok(ProviderKind::DEFAULT)
            }
            UnknownProviderPolicy::Reject => {
                Err(ParleyError::UnknownProvider(name.to_string()).into())
            }
        },
    }
}
