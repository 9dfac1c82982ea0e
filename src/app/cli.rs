#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Chat,
    Repl,
    Models,
    Run,
    Doctor,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "chat" => CliVerb::Chat,
        "repl" => CliVerb::Repl,
        "models" => CliVerb::Models,
        "run" => CliVerb::Run,
        "doctor" => CliVerb::Doctor,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  chat                                 Open the full-screen chat session".to_string(),
        "  repl                                 Chat over plain stdin/stdout".to_string(),
        "  models                               List installed models".to_string(),
        "  run <model> <prompt> [--timeout <s>] Run one prompt to completion and print it"
            .to_string(),
        "  doctor                               Check the local model runner and config"
            .to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}
