use crate::runner::{io_error, ModelRunner, RunnerError};
use std::io::{BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

pub(crate) fn spawn_piped(binary: &str, args: &[&str]) -> Result<Child, RunnerError> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    match command.spawn() {
        Ok(child) => Ok(child),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(RunnerError::Unavailable {
            binary: binary.to_string(),
        }),
        Err(err) => Err(io_error("spawning model runner", err)),
    }
}

/// Runs the runner to completion, reading stdout/stderr from dedicated
/// threads so a chatty child cannot deadlock on a full pipe.
pub(crate) fn run_capture(
    binary: &str,
    args: &[&str],
    timeout: Option<Duration>,
) -> Result<Captured, RunnerError> {
    let mut child = spawn_piped(binary, args)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error("taking stdout pipe", std::io::Error::other("missing pipe")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error("taking stderr pipe", std::io::Error::other("missing pipe")))?;

    let stdout_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stdout);
        let _ = reader.read_to_string(&mut buf);
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut buf);
        buf
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(limit) = timeout {
                    if started.elapsed() > limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        // The reader threads are left to drain on their
                        // own; joining here can block on pipe ends still
                        // held by the child's descendants.
                        return Err(RunnerError::Timeout {
                            timeout_ms: limit.as_millis() as u64,
                        });
                    }
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            }
            Err(err) => return Err(io_error("waiting for model runner exit", err)),
        }
    };

    Ok(Captured {
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
        status,
    })
}

pub(crate) fn generate(
    runner: &ModelRunner,
    model: &str,
    prompt: &str,
    timeout: Option<Duration>,
) -> Result<String, RunnerError> {
    runner.ensure_ready(model)?;
    let captured = run_capture(&runner.binary, &["run", model, prompt], timeout)?;
    if !captured.status.success() {
        return Err(RunnerError::ExecutionFailed {
            exit_code: captured.status.code().unwrap_or(-1),
            stderr: captured.stderr.trim().to_string(),
        });
    }
    Ok(captured.stdout.trim().to_string())
}
