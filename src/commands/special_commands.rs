//! Special commands parser for interactive chat
//!
//! Lines starting with `/` are handled by the chat loop instead of being
//! sent to the model. Commands are case-insensitive; `exit` and `quit` work
//! without the slash.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command takes no arguments but was given some
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a fresh chat with a new id
    NewChat,

    /// Show chat id, message count and session options
    ShowStatus,

    /// Display help information
    Help,

    /// Leave the chat
    Exit,

    /// Not a special command; send to the model
    None,
}

/// Parse a user input line into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognised `/` command
/// and `CommandError::UnsupportedArgument` when a known command is given an
/// argument.
///
/// # Examples
///
/// ```
/// use parley::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewChat);
/// assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
/// assert_eq!(
///     parse_special_command("what's on tonight?").unwrap(),
///     SpecialCommand::None
/// );
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let mut parts = lower.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    let parsed = match command {
        "/new" | "/clear" => SpecialCommand::NewChat,
        "/status" => SpecialCommand::ShowStatus,
        "/help" | "/?" => SpecialCommand::Help,
        "/exit" | "/quit" | "exit" | "quit" => SpecialCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    match arg {
        Some(arg) => Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        }),
        None => Ok(parsed),
    }
}

/// Print the special command reference
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

  /new, /clear    - Start a new chat (the current one stays in history)
  /status         - Show chat id, message count and session options
  /help           - Show this help
  /exit, exit     - Leave the chat (also: /quit, quit, Ctrl-D)

Anything else is sent to the assistant.
"#
    );
}
