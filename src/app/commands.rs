use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::chat::repl::run_chat_repl_stdio;
use crate::chat::tui::run_chat_tui;
use crate::config::{self, Settings};
use crate::runner::{ModelListing, ModelRunner};
use std::time::Duration;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Chat => cmd_chat(),
        CliVerb::Repl => cmd_repl(),
        CliVerb::Models => cmd_models(),
        CliVerb::Run => cmd_run(&args[1..]),
        CliVerb::Doctor => cmd_doctor(),
        CliVerb::Unknown => Err(format!("unknown command `{}`\n\n{}", args[0], help_text())),
    }
}

fn load_settings() -> Result<Settings, String> {
    config::load_global_settings().map_err(|err| err.to_string())
}

fn cmd_chat() -> Result<String, String> {
    let settings = load_settings()?;
    run_chat_tui(&settings)?;
    Ok("chat ended".to_string())
}

fn cmd_repl() -> Result<String, String> {
    let settings = load_settings()?;
    run_chat_repl_stdio(&settings)
}

fn cmd_models() -> Result<String, String> {
    let settings = load_settings()?;
    let runner = ModelRunner::new(settings.runner_binary);
    Ok(runner.list_models().display_names().join("\n"))
}

pub(crate) struct RunArgs {
    pub model: String,
    pub prompt: String,
    pub timeout: Option<Duration>,
}

pub(crate) fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    let mut model = None;
    let mut prompt_words: Vec<&str> = Vec::new();
    let mut timeout = None;

    let mut index = 0;
    while index < args.len() {
        let arg = args[index].as_str();
        if arg == "--timeout" {
            let value = args
                .get(index + 1)
                .ok_or_else(|| "`--timeout` requires a value in seconds".to_string())?;
            let secs: u64 = value
                .parse()
                .map_err(|_| format!("invalid `--timeout` value `{value}`"))?;
            if secs == 0 {
                return Err("`--timeout` must be greater than zero".to_string());
            }
            timeout = Some(Duration::from_secs(secs));
            index += 2;
            continue;
        }
        if model.is_none() {
            model = Some(arg.to_string());
        } else {
            prompt_words.push(arg);
        }
        index += 1;
    }

    let model = model.ok_or_else(|| "usage: run <model> <prompt> [--timeout <secs>]".to_string())?;
    if prompt_words.is_empty() {
        return Err("usage: run <model> <prompt> [--timeout <secs>]".to_string());
    }
    Ok(RunArgs {
        model,
        prompt: prompt_words.join(" "),
        timeout,
    })
}

fn cmd_run(args: &[String]) -> Result<String, String> {
    let settings = load_settings()?;
    let parsed = parse_run_args(args)?;
    let timeout = parsed
        .timeout
        .or_else(|| settings.generation_timeout_secs.map(Duration::from_secs));
    let runner = ModelRunner::new(settings.runner_binary);
    runner
        .generate_blocking(&parsed.model, &parsed.prompt, timeout)
        .map_err(|err| err.to_string())
}

fn cmd_doctor() -> Result<String, String> {
    let settings = load_settings()?;
    let runner = ModelRunner::new(settings.runner_binary.clone());
    let mut lines = Vec::new();

    if runner.is_available() {
        lines.push(format!("runner: `{}` found", settings.runner_binary));
        match runner.list_models() {
            ModelListing::Available(names) => {
                lines.push(format!("models: {} installed", names.len()));
                for name in names {
                    lines.push(format!("  {name}"));
                }
            }
            ModelListing::Unavailable(fault) => {
                lines.push(format!("models: unavailable {}", fault.display_name()));
            }
        }
    } else {
        lines.push(format!(
            "runner: `{}` not found on PATH",
            settings.runner_binary
        ));
    }

    match config::default_global_config_path() {
        Ok(path) if path.exists() => lines.push(format!("config: {}", path.display())),
        Ok(path) => lines.push(format!(
            "config: {} absent, using defaults",
            path.display()
        )),
        Err(err) => lines.push(format!("config: {err}")),
    }

    match settings.default_model {
        Some(model) => lines.push(format!("default model: {model}")),
        None => lines.push("default model: (first listed)".to_string()),
    }

    Ok(lines.join("\n"))
}
