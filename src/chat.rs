use crate::runner::ModelListing;
use crate::session::SessionState;
use std::path::PathBuf;

pub mod repl;
pub mod tui;

pub const CHAT_EXIT_COMMANDS: &[&str] = &["/exit", "exit", "quit"];

pub fn is_exit_command(message: &str) -> bool {
    CHAT_EXIT_COMMANDS
        .iter()
        .any(|command| message.eq_ignore_ascii_case(command))
}

/// Session intents both chat frontends accept as slash commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    NewConversation,
    ShowHistory,
    OpenEntry(usize),
    ListModels,
    SelectModel(String),
    AttachFile(PathBuf),
    ToggleUploader,
    Cancel,
    Help,
    Invalid(String),
}

pub fn parse_chat_command(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if is_exit_command(trimmed) {
        return Some(ChatCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or("");
    let command = match verb {
        "/new" => ChatCommand::NewConversation,
        "/history" => ChatCommand::ShowHistory,
        "/open" => match rest.parse::<usize>() {
            Ok(index) if index > 0 => ChatCommand::OpenEntry(index),
            _ => ChatCommand::Invalid("usage: /open <history number>".to_string()),
        },
        "/models" => ChatCommand::ListModels,
        "/model" => {
            if rest.is_empty() {
                ChatCommand::Invalid("usage: /model <name>".to_string())
            } else {
                ChatCommand::SelectModel(rest.to_string())
            }
        }
        "/attach" => {
            if rest.is_empty() {
                ChatCommand::Invalid("usage: /attach <path>".to_string())
            } else {
                ChatCommand::AttachFile(PathBuf::from(rest))
            }
        }
        "/uploader" => ChatCommand::ToggleUploader,
        "/cancel" => ChatCommand::Cancel,
        "/help" => ChatCommand::Help,
        other => ChatCommand::Invalid(format!("unknown command `{other}`; try /help")),
    };
    Some(command)
}

pub fn chat_help_lines() -> Vec<String> {
    vec![
        "/new              archive the current conversation and start fresh".to_string(),
        "/history          list archived conversations".to_string(),
        "/open <n>         restore archived conversation number <n>".to_string(),
        "/models           list installed models".to_string(),
        "/model <name>     switch to an installed model".to_string(),
        "/attach <path>    stage a file to send with the next prompt".to_string(),
        "/uploader         toggle the attachment uploader".to_string(),
        "/cancel           abort the in-flight generation".to_string(),
        "/exit             quit".to_string(),
    ]
}

/// Numbered history listing, most recent first, with a short preview of
/// the final message.
pub fn history_lines(state: &SessionState) -> Vec<String> {
    if state.history.is_empty() {
        return vec!["no past chats yet".to_string()];
    }
    state
        .history
        .iter()
        .rev()
        .enumerate()
        .map(|(index, entry)| {
            let preview = entry
                .messages
                .last()
                .map(|message| {
                    message
                        .content
                        .split_whitespace()
                        .take(10)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            format!(
                "{}. {} [model={}, {} messages] {}",
                index + 1,
                entry.title,
                entry.model,
                entry.messages.len(),
                preview
            )
        })
        .collect()
}

/// Maps a displayed history number (1 = most recent) back to the entry id.
pub fn resolve_history_entry(state: &SessionState, display_index: usize) -> Option<String> {
    if display_index == 0 || display_index > state.history.len() {
        return None;
    }
    let entry = &state.history[state.history.len() - display_index];
    Some(entry.id.clone())
}

/// Re-check the selected model against the listing each cycle; an invalid
/// or stale selection falls back to the first displayed name, which may be
/// a non-selectable placeholder that the gateway will refuse.
pub fn ensure_selected_model(state: &mut SessionState, listing: &ModelListing) {
    let display = listing.display_names();
    if display.iter().any(|name| name == state.current_model()) {
        return;
    }
    let fallback = display.first().cloned().unwrap_or_default();
    state.set_current_model(fallback);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ListingFault, ModelListing};

    #[test]
    fn exit_commands_are_case_insensitive() {
        assert!(is_exit_command("/exit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("Quit"));
        assert!(!is_exit_command("continue"));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(parse_chat_command("hello world").is_none());
        assert!(parse_chat_command("  how do I /open files?  ").is_none());
    }

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(parse_chat_command("/new"), Some(ChatCommand::NewConversation));
        assert_eq!(parse_chat_command("/history"), Some(ChatCommand::ShowHistory));
        assert_eq!(parse_chat_command("/open 2"), Some(ChatCommand::OpenEntry(2)));
        assert_eq!(
            parse_chat_command("/model qwen2.5-coder:7b"),
            Some(ChatCommand::SelectModel("qwen2.5-coder:7b".to_string()))
        );
        assert_eq!(
            parse_chat_command("/attach /tmp/notes.txt"),
            Some(ChatCommand::AttachFile(PathBuf::from("/tmp/notes.txt")))
        );
        assert_eq!(parse_chat_command("/uploader"), Some(ChatCommand::ToggleUploader));
        assert_eq!(parse_chat_command("/cancel"), Some(ChatCommand::Cancel));
        assert_eq!(parse_chat_command("/help"), Some(ChatCommand::Help));
    }

    #[test]
    fn malformed_commands_report_usage() {
        assert!(matches!(
            parse_chat_command("/open zero"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_chat_command("/open 0"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_chat_command("/model"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_chat_command("/frobnicate"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn history_listing_numbers_most_recent_first() {
        let mut state = SessionState::new();
        state.set_current_model("llama3");
        state.append_exchange("first question", "first answer", Vec::new());
        state.archive_and_reset(100);
        state.append_exchange("second question", "second answer", Vec::new());
        state.archive_and_reset(100);

        let lines = history_lines(&state);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1. "));
        assert!(lines[0].contains("second answer"));
        assert!(lines[1].starts_with("2. "));
        assert!(lines[1].contains("first answer"));
    }

    #[test]
    fn history_numbers_resolve_to_entry_ids() {
        let mut state = SessionState::new();
        state.set_current_model("llama3");
        state.append_exchange("first", "a", Vec::new());
        let first_id = state.archive_and_reset(100).expect("archived");
        state.append_exchange("second", "b", Vec::new());
        let second_id = state.archive_and_reset(100).expect("archived");

        assert_eq!(resolve_history_entry(&state, 1), Some(second_id));
        assert_eq!(resolve_history_entry(&state, 2), Some(first_id));
        assert_eq!(resolve_history_entry(&state, 0), None);
        assert_eq!(resolve_history_entry(&state, 3), None);
    }

    #[test]
    fn stale_model_selection_falls_back_to_first_displayed_name() {
        let mut state = SessionState::new();
        state.set_current_model("removed-model");
        let listing = ModelListing::Available(vec!["llama3".to_string(), "phi3".to_string()]);
        ensure_selected_model(&mut state, &listing);
        assert_eq!(state.current_model(), "llama3");

        ensure_selected_model(&mut state, &listing);
        assert_eq!(state.current_model(), "llama3");
    }

    #[test]
    fn unavailable_listing_selects_the_placeholder() {
        let mut state = SessionState::new();
        let listing = ModelListing::Unavailable(ListingFault::RunnerMissing {
            binary: "ollama".to_string(),
        });
        ensure_selected_model(&mut state, &listing);
        assert_eq!(state.current_model(), "(ollama not found)");
    }
}
