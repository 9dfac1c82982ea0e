use chatdeck::chat::repl::run_chat_repl;
use chatdeck::config::Settings;
use std::fs;
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::tempdir;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

fn echo_runner(dir: &Path) -> String {
    let bin = dir.join("ollama-mock");
    write_script(
        &bin,
        r#"#!/bin/sh
if [ "$1" = "list" ]; then
  if [ "$2" = "--json" ]; then
    echo '{"name":"llama3"}'
    echo '{"name":"phi3"}'
  else
    echo "NAME SIZE MODIFIED"
    echo "llama3 4GB today"
  fi
  exit 0
fi
printf 'echo: %s' "$3"
"#,
    );
    bin.display().to_string()
}

fn settings_for(runner_binary: String) -> Settings {
    Settings {
        runner_binary,
        ..Settings::default()
    }
}

fn run_session(settings: &Settings, script: &str) -> (String, String) {
    let mut input = Cursor::new(script.as_bytes().to_vec());
    let mut output: Vec<u8> = Vec::new();
    let summary = run_chat_repl(settings, &mut input, &mut output).expect("repl session");
    (String::from_utf8(output).expect("utf8 output"), summary)
}

#[test]
fn repl_streams_a_turn_and_reports_the_model_header() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));

    let (output, summary) = run_session(&settings, "say hello\n/exit\n");

    assert!(output.contains("chatdeck repl model=llama3"));
    assert!(output.contains("assistant> echo: say hello"));
    assert!(output.contains("[llama3 · "));
    assert!(summary.starts_with("chat ended"));
    assert!(summary.contains("messages=2"));
}

#[test]
fn repl_eof_ends_the_session_like_exit() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));

    let (_, summary) = run_session(&settings, "");
    assert!(summary.starts_with("chat ended"));
    assert!(summary.contains("messages=0"));
}

#[test]
fn repl_lists_models_and_switches_between_them() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));

    let (output, _) = run_session(
        &settings,
        "/models\n/model phi3\n/model mistral\n/exit\n",
    );

    assert!(output.contains("llama3"));
    assert!(output.contains("phi3"));
    assert!(output.contains("model set to phi3"));
    assert!(output.contains("`mistral` is not an installed model"));
}

#[test]
fn repl_archives_and_restores_through_slash_commands() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));

    let (output, summary) = run_session(
        &settings,
        "remember this\n/new\n/history\n/open 1\n/exit\n",
    );

    assert!(output.contains("archived previous conversation"));
    assert!(output.contains("1. Chat "));
    assert!(output.contains("restored `Chat "));
    assert!(summary.contains("messages=2"));
}

#[test]
fn repl_reports_empty_history() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));

    let (output, _) = run_session(&settings, "/history\n/open 1\n/exit\n");
    assert!(output.contains("no past chats yet"));
    assert!(output.contains("no history entry number 1"));
}

#[test]
fn repl_stages_attachments_and_sends_them_with_the_next_prompt() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));
    let attachment = dir.path().join("notes.txt");
    fs::write(&attachment, "attached contents").expect("write attachment");

    let (output, summary) = run_session(
        &settings,
        &format!("/attach {}\nread my notes\n/exit\n", attachment.display()),
    );

    assert!(output.contains("staged notes.txt (text/plain, 17 bytes)"));
    assert!(output.contains("assistant> echo: read my notes"));
    assert!(summary.contains("messages=2"));
}

#[test]
fn repl_surfaces_generation_failures_inline() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("ollama-fail");
    write_script(
        &bin,
        r#"#!/bin/sh
if [ "$1" = "list" ]; then
  echo '{"name":"llama3"}'
  exit 0
fi
echo 'model exploded' 1>&2
exit 2
"#,
    );
    let settings = settings_for(bin.display().to_string());

    let (output, summary) = run_session(&settings, "hi\n/exit\n");

    assert!(output.contains("model exploded"));
    assert!(summary.contains("messages=2"));
}

#[test]
fn repl_with_a_missing_runner_shows_the_placeholder_and_keeps_going() {
    let settings = settings_for("/nonexistent/chatdeck-no-such-runner".to_string());

    let (output, summary) = run_session(&settings, "hello anyway\n/exit\n");

    assert!(output.contains("model=(/nonexistent/chatdeck-no-such-runner not found)"));
    assert!(output.contains("is not installed or not on PATH"));
    assert!(summary.contains("messages=2"));
}

#[test]
fn repl_help_and_uploader_toggle() {
    let dir = tempdir().expect("tempdir");
    let settings = settings_for(echo_runner(dir.path()));

    let (output, _) = run_session(&settings, "/help\n/uploader\n/uploader\n/cancel\n/exit\n");

    assert!(output.contains("/attach <path>"));
    assert!(output.contains("attachment uploader open"));
    assert!(output.contains("attachment uploader closed"));
    assert!(output.contains("no generation in progress"));
}
