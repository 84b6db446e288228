//! Settings commands
//!
//! Save the active provider with its key, save or clear MCP endpoints, and
//! show what is configured.

use crate::cli::SettingsCommand;
use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::providers::ProviderKind;
use crate::settings::{
    active_provider, available_providers, load_mcp_settings, mcp_status, reset_mcp_settings,
    save_mcp_settings, save_provider_settings,
};
use crate::storage::KeyValueStore;
use colored::Colorize;

/// Handle settings commands
pub fn handle_settings(config: &Config, command: SettingsCommand) -> Result<()> {
    let store = super::open_store(config)?;
    run(store.as_ref(), command)
}

/// Apply `command` to `store`
pub fn run(store: &dyn KeyValueStore, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Provider { name, api_key } => {
            let kind = ProviderKind::from_name(&name)
                .ok_or_else(|| ParleyError::UnknownProvider(name.clone()))?;
            save_provider_settings(store, kind, &api_key)?;
            println!("{}", format!("Saved {} as the active provider", kind).green());
        }
        SettingsCommand::Mcp { http, sse } => {
            save_mcp_settings(store, &http, &sse)?;
            match mcp_status(&http, &sse) {
                Some(status) => println!("{}", status.green()),
                None => println!("{}", "MCP endpoints cleared".yellow()),
            }
        }
        SettingsCommand::ResetMcp => {
            reset_mcp_settings(store)?;
            println!("{}", "MCP endpoints cleared".yellow());
        }
        SettingsCommand::Show => show(store)?,
    }
    Ok(())
}

fn show(store: &dyn KeyValueStore) -> Result<()> {
    let active = active_provider(store)?;
    let available = available_providers(store);
    let mcp = load_mcp_settings(store)?;

    println!();
    println!(
        "Active provider:  {}",
        active
            .map(|k| k.name().cyan().to_string())
            .unwrap_or_else(|| "none (add one with `parley settings provider`)".yellow().to_string())
    );
    println!(
        "Providers with keys: {}",
        if available.is_empty() {
            "none".to_string()
        } else {
            available
                .iter()
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!(
        "MCP HTTP endpoint: {}",
        mcp.http_url.as_deref().unwrap_or("-")
    );
    println!("MCP SSE endpoint:  {}", mcp.sse_url.as_deref().unwrap_or("-"));
    if let Some(status) = mcp_status(
        mcp.http_url.as_deref().unwrap_or_default(),
        mcp.sse_url.as_deref().unwrap_or_default(),
    ) {
        println!("{}", status.green());
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, HTTP_URL_KEY, PROVIDER_KEY, SSE_URL_KEY};

    #[test]
    fn test_provider_command_saves_key() {
        let store = MemoryStore::new();
        run(
            &store,
            SettingsCommand::Provider {
                name: "groq".into(),
                api_key: " gsk-1 ".into(),
            },
        )
        .unwrap();
        assert_eq!(store.get(PROVIDER_KEY).unwrap().as_deref(), Some("Groq"));
        assert_eq!(store.get("groq_api_key").unwrap().as_deref(), Some("gsk-1"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let store = MemoryStore::new();
        let err = run(
            &store,
            SettingsCommand::Provider {
                name: "Cohere".into(),
                api_key: "k".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::UnknownProvider(n)) if n == "Cohere"
        ));
        assert_eq!(store.get(PROVIDER_KEY).unwrap(), None);
    }

    #[test]
    fn test_mcp_then_reset() {
        let store = MemoryStore::new();
        run(
            &store,
            SettingsCommand::Mcp {
                http: "http://localhost:3000/mcp".into(),
                sse: String::new(),
            },
        )
        .unwrap();
        assert_eq!(
            store.get(HTTP_URL_KEY).unwrap().as_deref(),
            Some("http://localhost:3000/mcp")
        );

        run(&store, SettingsCommand::ResetMcp).unwrap();
        assert_eq!(store.get(HTTP_URL_KEY).unwrap(), None);
        assert_eq!(store.get(SSE_URL_KEY).unwrap(), None);
    }

    #[test]
    fn test_show_with_empty_store() {
        run(&MemoryStore::new(), SettingsCommand::Show).unwrap();
    }
}
