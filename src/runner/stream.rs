use crate::runner::blocking::spawn_piped;
use crate::runner::{io_error, CancelToken, ModelRunner, RunnerError, StreamControl};
use std::io::{BufReader, Read};
use std::process::{Child, ChildStdout};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CHUNK_BUFFER_BYTES: usize = 4096;
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) fn generate(
    runner: &ModelRunner,
    model: &str,
    prompt: &str,
    control: StreamControl,
) -> Result<GenerationStream, RunnerError> {
    runner.ensure_ready(model)?;

    let mut child = spawn_piped(&runner.binary, &["run", model, prompt])?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error("taking stdout pipe", std::io::Error::other("missing pipe")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error("taking stderr pipe", std::io::Error::other("missing pipe")))?;

    let (chunk_tx, chunk_rx) = mpsc::channel();
    thread::spawn(move || read_chunks(stdout, chunk_tx));
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut buf);
        buf
    });

    Ok(GenerationStream {
        child,
        chunk_rx,
        stderr_reader: Some(stderr_reader),
        deadline: control.timeout.map(|limit| Instant::now() + limit),
        timeout: control.timeout,
        cancel: control.cancel,
        finished: false,
    })
}

/// Forwards stdout fragments in arrival order. Reads are raw (not line
/// buffered); multi-byte UTF-8 sequences split across reads are held back
/// until complete.
fn read_chunks(mut stdout: ChildStdout, tx: Sender<String>) {
    let mut carry: Vec<u8> = Vec::new();
    let mut buf = [0u8; CHUNK_BUFFER_BYTES];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                carry.extend_from_slice(&buf[..n]);
                let chunk = take_complete_utf8(&mut carry);
                if !chunk.is_empty() && tx.send(chunk).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    if !carry.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&carry).into_owned());
    }
}

/// Splits the longest decodable prefix out of `carry`, leaving an
/// incomplete trailing sequence (at most three bytes) behind for the next
/// read. Invalid bytes decode to U+FFFD.
pub(crate) fn take_complete_utf8(carry: &mut Vec<u8>) -> String {
    let mut bytes = std::mem::take(carry);
    let mut out = String::new();
    loop {
        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                out.push_str(text);
                bytes.clear();
                break;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                out.push_str(std::str::from_utf8(&bytes[..valid]).unwrap_or_default());
                match err.error_len() {
                    Some(skip) => {
                        out.push('\u{FFFD}');
                        bytes.drain(..valid + skip);
                    }
                    None => {
                        bytes.drain(..valid);
                        break;
                    }
                }
            }
        }
    }
    *carry = bytes;
    out
}

/// Lazy, single-pass stream of generation output. The child process and
/// both of its pipes are reclaimed on every exit path: normal exhaustion,
/// failure, cancellation, and early drop.
pub struct GenerationStream {
    child: Child,
    chunk_rx: Receiver<String>,
    stderr_reader: Option<JoinHandle<String>>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
    finished: bool,
}

impl Iterator for GenerationStream {
    type Item = Result<String, RunnerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self
                .cancel
                .as_ref()
                .map(|token| token.is_cancelled())
                .unwrap_or(false)
            {
                self.abort();
                return Some(Err(RunnerError::Cancelled));
            }
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
                    self.abort();
                    return Some(Err(RunnerError::Timeout { timeout_ms }));
                }
            }
            match self.chunk_rx.recv_timeout(STREAM_POLL_INTERVAL) {
                Ok(chunk) => return Some(Ok(chunk)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return self.finish(),
            }
        }
    }
}

impl GenerationStream {
    fn abort(&mut self) {
        self.finished = true;
        let _ = self.child.kill();
        let _ = self.child.wait();
        // Dropped, not joined: the stderr pipe can outlive the killed child
        // through its descendants, and an abort must not wait on them.
        drop(self.stderr_reader.take());
    }

    /// Output stream closed; the exit status decides success or failure.
    fn finish(&mut self) -> Option<Result<String, RunnerError>> {
        self.finished = true;
        let status = match self.child.wait() {
            Ok(status) => status,
            Err(err) => return Some(Err(io_error("waiting for model runner exit", err))),
        };
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            return None;
        }
        let stderr = stderr.trim();
        let stderr = if stderr.is_empty() {
            "Unknown error".to_string()
        } else {
            stderr.to_string()
        };
        Some(Err(RunnerError::ExecutionFailed {
            exit_code: status.code().unwrap_or(-1),
            stderr,
        }))
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}

/// Drains a chunk sequence through `on_chunk`, returning the joined,
/// trimmed text.
pub fn drain_with_progress<I, F>(chunks: I, mut on_chunk: F) -> Result<String, RunnerError>
where
    I: IntoIterator<Item = Result<String, RunnerError>>,
    F: FnMut(&str),
{
    let mut out = String::new();
    for chunk in chunks {
        let chunk = chunk?;
        on_chunk(&chunk);
        out.push_str(&chunk);
    }
    Ok(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::{drain_with_progress, take_complete_utf8};
    use crate::runner::RunnerError;

    #[test]
    fn utf8_sequences_split_across_reads_are_held_back() {
        // "né" with the two-byte é split between reads
        let mut carry = vec![b'n', 0xC3];
        let first = take_complete_utf8(&mut carry);
        assert_eq!(first, "n");
        assert_eq!(carry, vec![0xC3]);

        carry.push(0xA9);
        let second = take_complete_utf8(&mut carry);
        assert_eq!(second, "é");
        assert!(carry.is_empty());
    }

    #[test]
    fn invalid_bytes_become_replacement_chars() {
        let mut carry = vec![b'a', 0xFF, b'b'];
        let text = take_complete_utf8(&mut carry);
        assert_eq!(text, "a\u{FFFD}b");
        assert!(carry.is_empty());
    }

    #[test]
    fn drain_invokes_callback_per_chunk_in_order_and_trims() {
        let chunks = vec![
            Ok("Hel".to_string()),
            Ok("lo, ".to_string()),
            Ok("world".to_string()),
        ];
        let mut seen = Vec::new();
        let joined = drain_with_progress(chunks, |chunk| seen.push(chunk.to_string()))
            .expect("drain succeeds");
        assert_eq!(joined, "Hello, world");
        assert_eq!(seen, vec!["Hel", "lo, ", "world"]);
    }

    #[test]
    fn drain_trims_surrounding_whitespace() {
        let chunks = vec![Ok("  hi".to_string()), Ok(" there\n".to_string())];
        let joined = drain_with_progress(chunks, |_| {}).expect("drain succeeds");
        assert_eq!(joined, "hi there");
    }

    #[test]
    fn drain_stops_at_first_error() {
        let chunks = vec![
            Ok("partial".to_string()),
            Err(RunnerError::ExecutionFailed {
                exit_code: 1,
                stderr: "boom".to_string(),
            }),
            Ok("never seen".to_string()),
        ];
        let mut calls = 0;
        let err = drain_with_progress(chunks, |_| calls += 1).expect_err("error propagates");
        assert_eq!(calls, 1);
        match err {
            RunnerError::ExecutionFailed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
