use crate::chat::{
    chat_help_lines, ensure_selected_model, history_lines, parse_chat_command,
    resolve_history_entry, ChatCommand,
};
use crate::config::{default_state_root_path, Settings};
use crate::runner::{ModelRunner, StreamControl};
use crate::session::{Attachment, SessionState};
use crate::shared::append_session_log_line;
use crate::turn::{submit, TurnResult};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

pub fn run_chat_repl_stdio(settings: &Settings) -> Result<String, String> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut output = stdout.lock();
    run_chat_repl(settings, &mut input, &mut output)
}

/// Line-oriented chat session over any reader/writer pair. Chunks echo as
/// they arrive; the whole turn is synchronous.
pub fn run_chat_repl<R: BufRead, W: Write>(
    settings: &Settings,
    input: &mut R,
    output: &mut W,
) -> Result<String, String> {
    let runner = ModelRunner::new(settings.runner_binary.clone());
    let mut state = SessionState::new();
    let state_root = default_state_root_path().ok();

    let listing = runner.list_models();
    if let Some(model) = settings
        .default_model
        .as_deref()
        .filter(|name| listing.contains(name))
    {
        state.set_current_model(model);
    }
    ensure_selected_model(&mut state, &listing);

    writeln!(output, "chatdeck repl model={}", state.current_model())
        .map_err(|e| format!("failed to write chat output: {e}"))?;
    writeln!(output, "type `/exit` to quit, `/help` for commands")
        .map_err(|e| format!("failed to write chat output: {e}"))?;

    loop {
        write!(output, "you> ").map_err(|e| format!("failed to write chat prompt: {e}"))?;
        output
            .flush()
            .map_err(|e| format!("failed to flush chat prompt: {e}"))?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|e| format!("failed to read chat input: {e}"))?;
        if read == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match parse_chat_command(message) {
            Some(ChatCommand::Exit) => break,
            Some(command) => {
                for reply in handle_command(&mut state, &runner, settings, command) {
                    writeln!(output, "{reply}")
                        .map_err(|e| format!("failed to write chat output: {e}"))?;
                }
            }
            None => {
                run_prompt_turn(&mut state, &runner, settings, state_root.as_deref(), message, output)?;
            }
        }
    }

    Ok(format!(
        "chat ended\ntitle={}\nmessages={}",
        state.conversation.title,
        state.conversation.messages.len()
    ))
}

fn run_prompt_turn<W: Write>(
    state: &mut SessionState,
    runner: &ModelRunner,
    settings: &Settings,
    state_root: Option<&std::path::Path>,
    message: &str,
    output: &mut W,
) -> Result<(), String> {
    write!(output, "assistant> ").map_err(|e| format!("failed to write chat output: {e}"))?;
    output
        .flush()
        .map_err(|e| format!("failed to flush chat output: {e}"))?;

    let control = StreamControl::with_timeout(Duration::from_secs(settings.stream_timeout_secs));
    let mut echo_failed = false;
    let result = submit(state, runner, control, message, |chunk| {
        if write!(output, "{chunk}").and_then(|_| output.flush()).is_err() {
            echo_failed = true;
        }
    });
    if echo_failed {
        return Err("failed to write streamed chat output".to_string());
    }

    match result {
        TurnResult::Skipped => {
            writeln!(output).map_err(|e| format!("failed to write chat output: {e}"))?;
        }
        TurnResult::Cancelled => {
            writeln!(output, "(cancelled)")
                .map_err(|e| format!("failed to write chat output: {e}"))?;
        }
        TurnResult::Committed { failed, .. } => {
            let (header, body) = state
                .conversation
                .messages
                .last()
                .and_then(|message| message.content.split_once('\n'))
                .map(|(header, body)| (header.to_string(), body.to_string()))
                .unwrap_or_default();
            if failed {
                write!(output, "{body}")
                    .map_err(|e| format!("failed to write chat output: {e}"))?;
            }
            writeln!(output).map_err(|e| format!("failed to write chat output: {e}"))?;
            writeln!(output, "{header}")
                .map_err(|e| format!("failed to write chat output: {e}"))?;
            if let Some(root) = state_root {
                let _ = append_session_log_line(
                    root,
                    &format!("turn model={} failed={failed}", state.current_model()),
                );
            }
        }
    }
    Ok(())
}

/// Executes a non-exit slash command and returns the lines to print.
fn handle_command(
    state: &mut SessionState,
    runner: &ModelRunner,
    settings: &Settings,
    command: ChatCommand,
) -> Vec<String> {
    match command {
        ChatCommand::NewConversation => {
            let archived = state.archive_and_reset(settings.history_limit);
            match archived {
                Some(_) => vec![format!(
                    "archived previous conversation; started `{}`",
                    state.conversation.title
                )],
                None => vec![format!("started `{}`", state.conversation.title)],
            }
        }
        ChatCommand::ShowHistory => history_lines(state),
        ChatCommand::OpenEntry(index) => {
            let restored = resolve_history_entry(state, index)
                .map(|id| state.restore(&id))
                .unwrap_or(false);
            if restored {
                vec![format!(
                    "restored `{}` (model={})",
                    state.conversation.title,
                    state.current_model()
                )]
            } else {
                vec![format!("no history entry number {index}")]
            }
        }
        ChatCommand::ListModels => runner.list_models().display_names(),
        ChatCommand::SelectModel(name) => {
            let listing = runner.list_models();
            if listing.contains(&name) {
                state.set_current_model(name.as_str());
                vec![format!("model set to {name}")]
            } else {
                let mut lines = vec![format!("`{name}` is not an installed model; available:")];
                lines.extend(listing.display_names());
                lines
            }
        }
        ChatCommand::AttachFile(path) => stage_attachment(state, path),
        ChatCommand::ToggleUploader => {
            state.toggle_uploader();
            if state.uploader_open() {
                vec!["attachment uploader open".to_string()]
            } else {
                vec!["attachment uploader closed".to_string()]
            }
        }
        ChatCommand::Cancel => vec!["no generation in progress".to_string()],
        ChatCommand::Help => chat_help_lines(),
        ChatCommand::Invalid(reason) => vec![reason],
        ChatCommand::Exit => Vec::new(),
    }
}

fn stage_attachment(state: &mut SessionState, path: PathBuf) -> Vec<String> {
    match Attachment::from_path(&path) {
        Ok(attachment) => {
            let line = format!(
                "staged {} ({}, {} bytes); sends with the next prompt",
                attachment.name, attachment.media_type, attachment.byte_len
            );
            state.stage_attachments(vec![attachment]);
            vec![line]
        }
        Err(err) => vec![format!("failed to read {}: {err}", path.display())],
    }
}
