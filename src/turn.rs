use crate::runner::{ModelRunner, RunnerError, StreamControl};
use crate::session::{Attachment, SessionState};
use std::time::{Duration, Instant};

/// A validated turn: prompt, staged attachments, and the model captured at
/// submission time.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: String,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub submitted_at: Instant,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub assistant_body: String,
    pub elapsed: Duration,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    /// Empty input, nothing dispatched.
    Skipped,
    Committed {
        failed: bool,
        elapsed: Duration,
    },
    /// Cancelled mid-stream; partial output discarded, nothing committed.
    Cancelled,
}

/// Validation step. Empty or whitespace-only input with no staged
/// attachments is a no-op.
pub fn prepare_turn(state: &SessionState, raw_prompt: &str) -> Option<TurnRequest> {
    let prompt = raw_prompt.trim();
    if prompt.is_empty() && state.staged_attachments().is_empty() {
        return None;
    }
    Some(TurnRequest {
        model: state.current_model().to_string(),
        prompt: prompt.to_string(),
        attachments: state.staged_attachments().to_vec(),
        submitted_at: Instant::now(),
    })
}

/// Drives the generation stream. Elapsed time runs from the first chunk
/// when one arrived, otherwise from submission. Generation failures become
/// a visible assistant body instead of an error; only cancellation drops
/// the turn (returns None).
pub fn run_turn<F>(
    runner: &ModelRunner,
    request: &TurnRequest,
    control: StreamControl,
    mut on_chunk: F,
) -> Option<TurnOutcome>
where
    F: FnMut(&str),
{
    let mut first_chunk_at: Option<Instant> = None;
    let result = runner.generate_with_progress(&request.model, &request.prompt, control, |chunk| {
        if first_chunk_at.is_none() {
            first_chunk_at = Some(Instant::now());
        }
        on_chunk(chunk);
    });
    let elapsed = first_chunk_at.unwrap_or(request.submitted_at).elapsed();
    match result {
        Ok(body) => Some(TurnOutcome {
            assistant_body: body,
            elapsed,
            failed: false,
        }),
        Err(RunnerError::Cancelled) => None,
        Err(err) => Some(TurnOutcome {
            assistant_body: err.to_string(),
            elapsed,
            failed: true,
        }),
    }
}

/// Commit step: appends the user/assistant pair and clears the staged
/// attachment buffer.
pub fn commit_turn(state: &mut SessionState, request: &TurnRequest, outcome: &TurnOutcome) {
    let assistant_content =
        compose_assistant_content(&request.model, outcome.elapsed, &outcome.assistant_body);
    state.append_exchange(
        request.prompt.clone(),
        assistant_content,
        request.attachments.clone(),
    );
    state.clear_staged_attachments();
}

/// Full synchronous turn: validate, stream, commit.
pub fn submit<F>(
    state: &mut SessionState,
    runner: &ModelRunner,
    control: StreamControl,
    raw_prompt: &str,
    on_chunk: F,
) -> TurnResult
where
    F: FnMut(&str),
{
    let Some(request) = prepare_turn(state, raw_prompt) else {
        return TurnResult::Skipped;
    };
    match run_turn(runner, &request, control, on_chunk) {
        Some(outcome) => {
            let result = TurnResult::Committed {
                failed: outcome.failed,
                elapsed: outcome.elapsed,
            };
            commit_turn(state, &request, &outcome);
            result
        }
        None => TurnResult::Cancelled,
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Header block naming the model and elapsed time, followed by the body.
pub fn compose_assistant_content(model: &str, elapsed: Duration, body: &str) -> String {
    format!("[{model} · {}]\n{body}", format_elapsed(elapsed))
}
