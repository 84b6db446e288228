//! Model and provider listing commands
//!
//! `parley models list` prints the catalog for one provider; `parley
//! providers` prints every supported provider and where its key comes from.

use crate::cli::ModelCommand;
use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::providers::{ModelCatalog, ModelInfo, ProviderKind};
use crate::settings::active_provider;
use crate::storage::{api_key_store_key, get_non_empty, KeyValueStore};
use colored::Colorize;
use prettytable::{row, Table};
use std::time::Duration;

/// Handle model commands
pub async fn handle_models(config: &Config, command: ModelCommand) -> Result<()> {
    match command {
        ModelCommand::List { provider, json } => {
            let store = super::open_store(config)?;
            let kind = match provider {
                Some(name) => ProviderKind::from_name(&name)
                    .ok_or_else(|| ParleyError::UnknownProvider(name.clone()))?,
                None => match active_provider(store.as_ref())? {
                    Some(kind) => kind,
                    None => ProviderKind::from_name(&config.providers.default_provider)
                        .unwrap_or(ProviderKind::DEFAULT),
                },
            };
            list_models(config, kind, json).await
        }
    }
}

/// List models available from `kind`
///
/// # Examples
///
/// ```no_run
/// use parley::commands::models::list_models;
/// use parley::config::Config;
/// use parley::providers::ProviderKind;
///
/// # async fn example() -> anyhow::Result<()> {
/// list_models(&Config::default(), ProviderKind::Groq, false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(config: &Config, kind: ProviderKind, json: bool) -> Result<()> {
    tracing::info!("Listing models from provider: {}", kind);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.providers.request_timeout_seconds))
        .build()
        .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;
    let models = ModelCatalog::new(client).models(kind).await;

    if json {
        output_models_json(&models)
    } else {
        if models.is_empty() {
            println!("No models available from provider: {}", kind);
            return Ok(());
        }
        output_models_table(&models, kind);
        Ok(())
    }
}

fn output_models_json(models: &[ModelInfo]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(models)?);
    Ok(())
}

fn output_models_table(models: &[ModelInfo], kind: ProviderKind) {
    let mut table = Table::new();
    table.add_row(row!["Model ID", "Name", "Context Window"]);

    for model in models {
        table.add_row(row![
            model.id,
            model.name,
            format!("{} tokens", model.context_window)
        ]);
    }

    println!("\nAvailable models from {}:\n", kind);
    table.printstd();
    println!();
}

/// Where a provider's key would be taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Saved,
    Environment,
    Missing,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeySource::Saved => "saved",
            KeySource::Environment => "environment",
            KeySource::Missing => "-",
        })
    }
}

/// Key source for `kind`: the store first, then the environment
pub fn key_source(
    store: &dyn KeyValueStore,
    kind: ProviderKind,
    env: impl Fn(&str) -> Option<String>,
) -> KeySource {
    let saved = get_non_empty(store, &api_key_store_key(kind.name())).unwrap_or_else(|e| {
        tracing::warn!("Failed to read API key for {}: {}", kind, e);
        None
    });
    if saved.is_some() {
        KeySource::Saved
    } else if env(kind.env_var()).is_some_and(|v| !v.trim().is_empty()) {
        KeySource::Environment
    } else {
        KeySource::Missing
    }
}

/// Print every supported provider with its default model and key source
pub fn list_providers(config: &Config) -> Result<()> {
    let store = super::open_store(config)?;
    let active = active_provider(store.as_ref())?;

    let mut table = Table::new();
    table.add_row(row!["Provider", "Default Model", "API Key", ""]);
    for kind in ProviderKind::ALL {
        let source = key_source(store.as_ref(), kind, |name| std::env::var(name).ok());
        let marker = if active == Some(kind) {
            "active".green().to_string()
        } else {
            String::new()
        };
        table.add_row(row![kind.name(), kind.default_model(), source, marker]);
    }

    println!();
    table.printstd();
    println!();
    Ok(())
}
