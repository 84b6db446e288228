use crate::chat::Role;
use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::storage::ChatHistory;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let history = super::open_history(config)?;
    run(&history, command)
}

/// Apply `command` to `history`
pub fn run(history: &ChatHistory, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let chats = history.list_chats()?;

            if chats.is_empty() {
                println!("{}", "No chat history found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Model".bold(),
                "Messages".bold(),
                "Last Updated".bold()
            ]);

            for chat in chats {
                let id_short: String = chat.id.chars().take(8).collect();
                let title = if chat.title.chars().count() > 40 {
                    format!("{}...", chat.title.chars().take(37).collect::<String>())
                } else {
                    chat.title
                };
                let model = chat.model.unwrap_or_else(|| "-".to_string());
                let updated = chat.updated_at.format("%Y-%m-%d %H:%M").to_string();

                table.add_row(prettytable::row![
                    id_short.cyan(),
                    title,
                    model,
                    chat.message_count,
                    updated
                ]);
            }

            println!("\nChat History:");
            table.printstd();
            println!();
            println!("Use {} to resume a chat.", "parley chat --resume <ID>".cyan());
            println!();
        }
        HistoryCommand::Show { id } => {
            let state = history
                .load_chat(&id)?
                .ok_or_else(|| ParleyError::Storage(format!("No saved chat matches '{}'", id)))?;

            println!("\nChat {}\n", state.chat_id().cyan());
            for message in state.messages() {
                let label = match message.role {
                    Role::User => "you".bold().blue(),
                    Role::Assistant => "assistant".bold().green(),
                    Role::System => "system".bold().yellow(),
                };
                println!("{}: {}\n", label, message.content);
            }
        }
        HistoryCommand::Delete { id } => {
            let removed = history.delete_chat(&id)?;
            if removed == 0 {
                println!("{}", format!("No saved chat matches '{}'", id).yellow());
            } else {
                println!("{}", format!("Deleted {} chat(s) matching {}", removed, id).green());
            }
        }
    }

    Ok(())
}
