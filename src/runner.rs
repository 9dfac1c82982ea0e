use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod blocking;
pub mod list;
pub mod stream;

pub use list::{ListingFault, ModelListing};
pub use stream::{drain_with_progress, GenerationStream};

pub const DEFAULT_RUNNER_BINARY: &str = "ollama";

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("`{binary}` is not installed or not on PATH")]
    Unavailable { binary: String },
    #[error("`{model}` is not a selectable model; pick an installed model first")]
    InvalidModel { model: String },
    #[error("model runner exited with code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },
    #[error("generation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("generation cancelled")]
    Cancelled,
    #[error("io failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_error(context: &str, source: std::io::Error) -> RunnerError {
    RunnerError::Io {
        context: context.to_string(),
        source,
    }
}

/// Shared abort flag for an in-flight generation. Cloning hands out another
/// handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamControl {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl StreamControl {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }
}

/// Placeholder entries ("(ollama not found)" and friends) are produced for
/// display only and must never reach a child process invocation.
pub fn is_placeholder_name(name: &str) -> bool {
    name.trim_start().starts_with('(')
}

#[derive(Debug, Clone)]
pub struct ModelRunner {
    pub binary: String,
}

impl Default for ModelRunner {
    fn default() -> Self {
        Self {
            binary: DEFAULT_RUNNER_BINARY.to_string(),
        }
    }
}

impl ModelRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        resolve_binary(&self.binary).is_some()
    }

    pub fn list_models(&self) -> ModelListing {
        list::query_models(self)
    }

    pub fn generate_blocking(
        &self,
        model: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, RunnerError> {
        blocking::generate(self, model, prompt, timeout)
    }

    pub fn generate_streaming(
        &self,
        model: &str,
        prompt: &str,
        control: StreamControl,
    ) -> Result<GenerationStream, RunnerError> {
        stream::generate(self, model, prompt, control)
    }

    pub fn generate_with_progress<F>(
        &self,
        model: &str,
        prompt: &str,
        control: StreamControl,
        on_chunk: F,
    ) -> Result<String, RunnerError>
    where
        F: FnMut(&str),
    {
        let stream = self.generate_streaming(model, prompt, control)?;
        drain_with_progress(stream, on_chunk)
    }

    pub(crate) fn ensure_ready(&self, model: &str) -> Result<(), RunnerError> {
        if !self.is_available() {
            return Err(RunnerError::Unavailable {
                binary: self.binary.clone(),
            });
        }
        if model.trim().is_empty() || is_placeholder_name(model) {
            return Err(RunnerError::InvalidModel {
                model: model.to_string(),
            });
        }
        Ok(())
    }
}

fn resolve_binary(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
