/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`: Interactive chat
- `ask`: Single message, reply printed to stdout
- `settings`: Provider key and MCP endpoint settings
- `models`: Model and provider listings
- `history`: Saved chats

Chat turns go through [`Orchestrator`]; the handlers here only open the
stores, render display events and persist the resulting chat state.
*/

use crate::chat::{
    ChatState, DisplayEvent, Orchestrator, RequestContext, SubmitRequest, TurnFailure,
    TurnOutcome,
};
use crate::cli::TurnArgs;
use crate::config::Config;
use crate::credentials::process_env;
use crate::error::Result;
use crate::storage::{ChatHistory, SledStore};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod history;
pub mod models;
pub mod settings;
pub mod special_commands;

/// Open the settings store at the configured location
pub fn open_store(config: &Config) -> Result<Arc<SledStore>> {
    Ok(Arc::new(SledStore::open_default(
        config.storage.path.as_deref(),
    )?))
}

/// Open the chat history at the configured location
pub fn open_history(config: &Config) -> Result<ChatHistory> {
    ChatHistory::open_default(config.storage.history_path.as_deref())
}

/// Request for `text` with the session options and the local context
pub fn turn_request(config: &Config, text: &str, turn: &TurnArgs) -> SubmitRequest {
    SubmitRequest {
        text: text.to_string(),
        model_id: turn.model.clone(),
        provider_name: turn.provider.clone(),
        api_key: turn.api_key.clone(),
        http_url: turn.mcp_http.clone(),
        sse_url: turn.mcp_sse.clone(),
        context: RequestContext::from_env(&process_env(), Some(config.tools.platform.clone())),
    }
}

/// Print one display event to the terminal
pub fn render_event(event: &DisplayEvent) {
    match event {
        DisplayEvent::TextDelta(text) => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        DisplayEvent::ToolPending { message, .. } => {
            println!("{}", format!("  … {}", message).cyan());
        }
        DisplayEvent::ToolFinished { tool, result, .. } => {
            if result.success {
                println!("{}", format!("  ✓ {}", tool).green());
            } else {
                println!(
                    "{}",
                    format!(
                        "  ✗ {}: {}",
                        tool,
                        result.error.as_deref().unwrap_or("failed")
                    )
                    .red()
                );
            }
        }
        DisplayEvent::Error(message) => {
            eprintln!("\n{}", format!("Error: {}", message).red());
        }
    }
}

/// Submit one turn and render its events while it runs
pub async fn run_turn(
    orchestrator: &Orchestrator,
    events: &mut mpsc::UnboundedReceiver<DisplayEvent>,
    state: &ChatState,
    request: SubmitRequest,
) -> std::result::Result<TurnOutcome, TurnFailure> {
    let turn = orchestrator.submit(state, request);
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            Some(event) = events.recv() => render_event(&event),
            outcome = &mut turn => break outcome,
        }
    };
    while let Ok(event) = events.try_recv() {
        render_event(&event);
    }
    outcome
}

/// Save `state` unless the session is ephemeral; failures are only logged
fn persist(history: Option<&ChatHistory>, state: &ChatState, model: Option<&str>) {
    if let Some(history) = history {
        if let Err(e) = history.save_chat(state, model) {
            tracing::warn!("Failed to save chat {}: {}", state.chat_id(), e);
        }
    }
}

// Single message command handler
pub mod ask {
    //! One-shot turn: send a message, stream the reply, exit.

    use super::*;
    use crate::chat::TurnStatus;
    use crate::error::ParleyError;

    /// Send `text` as a new chat and print the reply
    ///
    /// # Errors
    ///
    /// Returns the turn failure (for example a missing API key) or a
    /// `ParleyError::Provider` when the response stream failed.
    pub async fn run_ask(config: &Config, text: &str, turn: TurnArgs) -> Result<()> {
        let store = open_store(config)?;
        let history = if turn.ephemeral {
            None
        } else {
            Some(open_history(config)?)
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(config, store)?.with_events(tx);
        let request = turn_request(config, text, &turn);

        let outcome = match run_turn(&orchestrator, &mut rx, &ChatState::new(), request).await {
            Ok(outcome) => outcome,
            Err(failure) => return Err(failure.error),
        };
        println!();

        persist(history.as_ref(), &outcome.state, turn.model.as_deref());
        match outcome.result.status {
            TurnStatus::Completed => Ok(()),
            TurnStatus::Failed(message) => Err(ParleyError::Provider(message).into()),
        }
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Runs a readline loop; every line that is not a special command is
    //! submitted as a turn and the returned chat state replaces the current
    //! one.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::error::ParleyError;
    use crate::settings::{load_mcp_settings, mcp_status};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `turn` - Provider, model, key and endpoint overrides for the session
    /// * `resume` - Id or id prefix of a saved chat to continue
    pub async fn run_chat(config: &Config, turn: TurnArgs, resume: Option<String>) -> Result<()> {
        let store = open_store(config)?;
        let history = if turn.ephemeral {
            None
        } else {
            Some(open_history(config)?)
        };

        let mut state = match &resume {
            Some(id) => {
                let history = match &history {
                    Some(h) => h.clone(),
                    None => open_history(config)?,
                };
                history.load_chat(id)?.ok_or_else(|| {
                    ParleyError::Storage(format!("No saved chat matches '{}'", id))
                })?
            }
            None => ChatState::new(),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(config, store.clone())?.with_events(tx);
        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&state);

        loop {
            match rl.readline(&format!("{} ", "you>".bold().blue())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::NewChat) => {
                            state = ChatState::new();
                            println!("{}\n", "Started a new chat".green());
                            continue;
                        }
                        Ok(SpecialCommand::ShowStatus) => {
                            let saved = load_mcp_settings(store.as_ref()).unwrap_or_default();
                            let http = turn.mcp_http.clone().or(saved.http_url);
                            let sse = turn.mcp_sse.clone().or(saved.sse_url);
                            let status = mcp_status(
                                http.as_deref().unwrap_or_default(),
                                sse.as_deref().unwrap_or_default(),
                            );
                            print_status(&state, &turn, status);
                            continue;
                        }
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {}
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    }

                    rl.add_history_entry(trimmed)?;
                    println!();

                    let request = turn_request(config, trimmed, &turn);
                    state = match run_turn(&orchestrator, &mut rx, &state, request).await {
                        Ok(outcome) => {
                            println!("\n");
                            outcome.state
                        }
                        Err(failure) => {
                            eprintln!("{}\n", format!("Error: {}", failure.error).red());
                            failure.state
                        }
                    };
                    persist(history.as_ref(), &state, turn.model.as_deref());
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        if history.is_some() && !state.is_empty() {
            println!(
                "Resume with {}",
                format!("parley chat --resume {}", state.chat_id()).cyan()
            );
        }
        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome_banner(state: &ChatState) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                Parley Interactive Chat                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        if !state.is_empty() {
            println!(
                "Resumed chat {} ({} messages)",
                state.chat_id().cyan(),
                state.len()
            );
        }
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_status(state: &ChatState, turn: &TurnArgs, mcp: Option<&str>) {
        println!();
        println!("Chat:          {}", state.chat_id().cyan());
        println!("Messages:      {}", state.len());
        println!(
            "Provider:      {}",
            turn.provider.as_deref().unwrap_or("(saved)")
        );
        println!(
            "Model:         {}",
            turn.model.as_deref().unwrap_or("(provider default)")
        );
        println!("Tool servers:  {}", mcp.unwrap_or("none configured"));
        println!("History:       {}", if turn.ephemeral { "off" } else { "on" });
        println!();
    }
}
