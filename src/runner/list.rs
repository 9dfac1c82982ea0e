use crate::runner::blocking::run_capture;
use crate::runner::{ModelRunner, RunnerError};
use serde_json::Value;
use std::time::Duration;

const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Listing outcome. Faults are tagged rather than encoded into magic
/// names; rendering a fault into a placeholder entry happens only at the
/// display boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelListing {
    Available(Vec<String>),
    Unavailable(ListingFault),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingFault {
    RunnerMissing { binary: String },
    NoModelsInstalled,
    QueryFailed(String),
}

impl ListingFault {
    pub fn display_name(&self) -> String {
        match self {
            ListingFault::RunnerMissing { binary } => format!("({binary} not found)"),
            ListingFault::NoModelsInstalled => "(no models installed)".to_string(),
            ListingFault::QueryFailed(reason) => format!("(error: {reason})"),
        }
    }
}

impl ModelListing {
    pub fn selectable_names(&self) -> &[String] {
        match self {
            ModelListing::Available(names) => names,
            ModelListing::Unavailable(_) => &[],
        }
    }

    pub fn first_selectable(&self) -> Option<&str> {
        self.selectable_names().first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.selectable_names().iter().any(|n| n == name)
    }

    /// Names for a selector widget; a fault becomes a single
    /// non-selectable placeholder entry.
    pub fn display_names(&self) -> Vec<String> {
        match self {
            ModelListing::Available(names) => names.clone(),
            ModelListing::Unavailable(fault) => vec![fault.display_name()],
        }
    }
}

pub(crate) fn query_models(runner: &ModelRunner) -> ModelListing {
    if !runner.is_available() {
        return ModelListing::Unavailable(ListingFault::RunnerMissing {
            binary: runner.binary.clone(),
        });
    }

    // Structured listing first; any failure falls through to the table form.
    if let Ok(captured) = run_capture(&runner.binary, &["list", "--json"], Some(LIST_TIMEOUT)) {
        if captured.status.success() {
            let names = parse_structured_names(&captured.stdout);
            if !names.is_empty() {
                return ModelListing::Available(names);
            }
        }
    }

    match run_capture(&runner.binary, &["list"], Some(LIST_TIMEOUT)) {
        Ok(captured) if captured.status.success() => {
            let names = parse_table_names(&captured.stdout);
            if names.is_empty() {
                ModelListing::Unavailable(ListingFault::NoModelsInstalled)
            } else {
                ModelListing::Available(names)
            }
        }
        Ok(captured) => {
            let stderr = captured.stderr.trim();
            let reason = if stderr.is_empty() {
                format!(
                    "listing exited with code {}",
                    captured.status.code().unwrap_or(-1)
                )
            } else {
                stderr.to_string()
            };
            ModelListing::Unavailable(ListingFault::QueryFailed(reason))
        }
        Err(RunnerError::Unavailable { binary }) => {
            ModelListing::Unavailable(ListingFault::RunnerMissing { binary })
        }
        Err(err) => ModelListing::Unavailable(ListingFault::QueryFailed(err.to_string())),
    }
}

/// Newline-delimited JSON objects, one model per line, `name` field.
fn parse_structured_names(stdout: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if let Some(name) = value.get("name").and_then(Value::as_str) {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Human table: optional NAME/SIZE/MODIFIED header row, then one model per
/// row with the name as the first whitespace-delimited token.
fn parse_table_names(stdout: &str) -> Vec<String> {
    let mut rows: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if rows
        .first()
        .map(|row| row.to_ascii_lowercase().starts_with("name"))
        .unwrap_or(false)
    {
        rows.remove(0);
    }
    rows.iter()
        .filter_map(|row| row.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_listing_takes_name_fields() {
        let stdout = r#"
{"name":"llama3","size":4200000000}
{"name":"qwen2.5-coder:7b"}

{"size":123}
not json at all
"#;
        assert_eq!(
            parse_structured_names(stdout),
            vec!["llama3".to_string(), "qwen2.5-coder:7b".to_string()]
        );
    }

    #[test]
    fn table_listing_skips_header_row() {
        let stdout = "NAME SIZE MODIFIED\nllama3  4GB  today\nqwen2.5-coder:7b  5GB  yesterday\n";
        assert_eq!(
            parse_table_names(stdout),
            vec!["llama3".to_string(), "qwen2.5-coder:7b".to_string()]
        );
    }

    #[test]
    fn table_listing_without_header_keeps_first_row() {
        let stdout = "llama3  4GB  today\n";
        assert_eq!(parse_table_names(stdout), vec!["llama3".to_string()]);
    }

    #[test]
    fn empty_table_yields_no_names() {
        assert!(parse_table_names("NAME SIZE MODIFIED\n").is_empty());
        assert!(parse_table_names("").is_empty());
    }

    #[test]
    fn faults_render_as_parenthesized_placeholders() {
        let missing = ModelListing::Unavailable(ListingFault::RunnerMissing {
            binary: "ollama".to_string(),
        });
        assert_eq!(missing.display_names(), vec!["(ollama not found)"]);
        assert!(missing.selectable_names().is_empty());
        assert!(missing.first_selectable().is_none());

        let none = ModelListing::Unavailable(ListingFault::NoModelsInstalled);
        assert_eq!(none.display_names(), vec!["(no models installed)"]);

        let failed = ModelListing::Unavailable(ListingFault::QueryFailed("boom".to_string()));
        assert_eq!(failed.display_names(), vec!["(error: boom)"]);
    }

    #[test]
    fn available_listing_is_selectable() {
        let listing = ModelListing::Available(vec!["llama3".to_string(), "phi3".to_string()]);
        assert_eq!(listing.first_selectable(), Some("llama3"));
        assert!(listing.contains("phi3"));
        assert!(!listing.contains("mistral"));
        assert_eq!(listing.display_names(), listing.selectable_names());
    }
}
