use crate::chat::{
    chat_help_lines, ensure_selected_model, history_lines, parse_chat_command,
    resolve_history_entry, ChatCommand,
};
use crate::config::{default_state_root_path, Settings};
use crate::runner::{CancelToken, ModelRunner, StreamControl};
use crate::session::{Attachment, Message, Role, SessionState};
use crate::shared::append_session_log_line;
use crate::turn::{commit_turn, prepare_turn, run_turn, TurnOutcome, TurnRequest};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const PROCESSING_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
const UI_POLL_INTERVAL: Duration = Duration::from_millis(60);
const SPINNER_TICK_INTERVAL: Duration = Duration::from_millis(120);
const CURSOR_BLINK_INTERVAL: Duration = Duration::from_millis(500);
const SHUTDOWN_DRAIN_LIMIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct ChatLine {
    speaker: &'static str,
    text: String,
}

enum TurnEvent {
    Chunk(String),
    Done(Option<TurnOutcome>),
}

struct TurnWorker {
    request: TurnRequest,
    cancel: CancelToken,
    event_rx: Receiver<TurnEvent>,
}

struct ChatTui {
    session: SessionState,
    runner: ModelRunner,
    settings: Settings,
    state_root: Option<PathBuf>,
    input: String,
    transcript: Vec<ChatLine>,
    processing: Option<TurnWorker>,
    partial: String,
    spinner_index: usize,
    last_spinner_tick: Instant,
    cursor_visible: bool,
    last_cursor_tick: Instant,
}

impl ChatTui {
    fn new(settings: Settings) -> Self {
        let runner = ModelRunner::new(settings.runner_binary.clone());
        let mut session = SessionState::new();
        let listing = runner.list_models();
        if let Some(model) = settings
            .default_model
            .as_deref()
            .filter(|name| listing.contains(name))
        {
            session.set_current_model(model);
        }
        ensure_selected_model(&mut session, &listing);

        let transcript = vec![ChatLine {
            speaker: "system",
            text: format!(
                "model={} title={}",
                session.current_model(),
                session.conversation.title
            ),
        }];

        Self {
            session,
            runner,
            settings,
            state_root: default_state_root_path().ok(),
            input: String::new(),
            transcript,
            processing: None,
            partial: String::new(),
            spinner_index: 0,
            last_spinner_tick: Instant::now(),
            cursor_visible: true,
            last_cursor_tick: Instant::now(),
        }
    }

    fn spinner_frame(&self) -> &'static str {
        PROCESSING_FRAMES[self.spinner_index % PROCESSING_FRAMES.len()]
    }

    fn advance_spinner_if_needed(&mut self) {
        if self.processing.is_some() && self.last_spinner_tick.elapsed() >= SPINNER_TICK_INTERVAL {
            self.spinner_index = (self.spinner_index + 1) % PROCESSING_FRAMES.len();
            self.last_spinner_tick = Instant::now();
        }
    }

    fn advance_cursor_blink_if_needed(&mut self) {
        if self.last_cursor_tick.elapsed() >= CURSOR_BLINK_INTERVAL {
            self.cursor_visible = !self.cursor_visible;
            self.last_cursor_tick = Instant::now();
        }
    }

    fn cursor_suffix(&self) -> &'static str {
        if self.cursor_visible {
            "█"
        } else {
            " "
        }
    }

    fn status_line(&self) -> String {
        if self.processing.is_some() {
            return format!(
                "assistant> thinking {} (model={}, Ctrl+C or /cancel to abort)",
                self.spinner_frame(),
                self.session.current_model()
            );
        }
        "enter text and press Enter; /help for commands, /exit to quit".to_string()
    }

    fn push_system(&mut self, text: impl Into<String>) {
        self.transcript.push(ChatLine {
            speaker: "system",
            text: text.into(),
        });
    }

    fn push_message_lines(&mut self, message: &Message) {
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        for (index, line) in message.content.lines().enumerate() {
            self.transcript.push(ChatLine {
                speaker: if index == 0 { speaker } else { "" },
                text: line.to_string(),
            });
        }
        if !message.attachments.is_empty() {
            let names: Vec<&str> = message
                .attachments
                .iter()
                .map(|a| a.name.as_str())
                .collect();
            self.transcript.push(ChatLine {
                speaker: "",
                text: format!("(attachments: {})", names.join(", ")),
            });
        }
    }

    fn rebuild_transcript(&mut self) {
        self.transcript.clear();
        self.push_system(format!(
            "model={} title={}",
            self.session.current_model(),
            self.session.conversation.title
        ));
        let messages = self.session.conversation.messages.clone();
        for message in &messages {
            self.push_message_lines(message);
        }
    }

    fn start_turn(&mut self, request: TurnRequest) {
        let cancel = CancelToken::new();
        let control = StreamControl {
            timeout: Some(Duration::from_secs(self.settings.stream_timeout_secs)),
            cancel: Some(cancel.clone()),
        };
        let runner = self.runner.clone();
        let worker_request = request.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let outcome = run_turn(&runner, &worker_request, control, |chunk| {
                let _ = tx.send(TurnEvent::Chunk(chunk.to_string()));
            });
            let _ = tx.send(TurnEvent::Done(outcome));
        });

        self.transcript.push(ChatLine {
            speaker: "you",
            text: request.prompt.clone(),
        });
        self.processing = Some(TurnWorker {
            request,
            cancel,
            event_rx: rx,
        });
        self.partial.clear();
        self.spinner_index = 0;
        self.last_spinner_tick = Instant::now();
    }

    /// Pumps worker events; commits on Done. All session mutation stays on
    /// the UI thread.
    fn pump_turn_events(&mut self) {
        let Some(worker) = self.processing.take() else {
            return;
        };
        loop {
            match worker.event_rx.try_recv() {
                Ok(TurnEvent::Chunk(chunk)) => self.partial.push_str(&chunk),
                Ok(TurnEvent::Done(outcome)) => {
                    self.finish_turn(&worker, outcome);
                    return;
                }
                Err(mpsc::TryRecvError::Empty) => {
                    self.processing = Some(worker);
                    return;
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.push_system("turn worker disconnected unexpectedly");
                    self.partial.clear();
                    return;
                }
            }
        }
    }

    fn finish_turn(&mut self, worker: &TurnWorker, outcome: Option<TurnOutcome>) {
        self.partial.clear();
        match outcome {
            Some(outcome) => {
                commit_turn(&mut self.session, &worker.request, &outcome);
                if let Some(message) = self.session.conversation.messages.last().cloned() {
                    self.push_message_lines(&message);
                }
                if let Some(root) = &self.state_root {
                    let _ = append_session_log_line(
                        root,
                        &format!(
                            "turn model={} failed={}",
                            worker.request.model, outcome.failed
                        ),
                    );
                }
            }
            None => {
                // Drop the optimistic user line; a cancelled turn commits
                // nothing.
                if let Some(position) = self.transcript.iter().rposition(|l| l.speaker == "you") {
                    self.transcript.truncate(position);
                }
                self.push_system("generation cancelled; partial output discarded");
            }
        }
    }

    fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::NewConversation => {
                let archived = self.session.archive_and_reset(self.settings.history_limit);
                self.rebuild_transcript();
                if archived.is_some() {
                    self.push_system("archived previous conversation");
                }
            }
            ChatCommand::ShowHistory => {
                for line in history_lines(&self.session) {
                    self.push_system(line);
                }
            }
            ChatCommand::OpenEntry(index) => {
                let restored = resolve_history_entry(&self.session, index)
                    .map(|id| self.session.restore(&id))
                    .unwrap_or(false);
                if restored {
                    self.rebuild_transcript();
                    self.push_system("restored archived conversation");
                } else {
                    self.push_system(format!("no history entry number {index}"));
                }
            }
            ChatCommand::ListModels => {
                for name in self.runner.list_models().display_names() {
                    self.push_system(name);
                }
            }
            ChatCommand::SelectModel(name) => {
                let listing = self.runner.list_models();
                if listing.contains(&name) {
                    self.session.set_current_model(name.as_str());
                    self.push_system(format!("model set to {name}"));
                } else {
                    self.push_system(format!("`{name}` is not an installed model"));
                }
            }
            ChatCommand::AttachFile(path) => match Attachment::from_path(&path) {
                Ok(attachment) => {
                    self.push_system(format!(
                        "staged {} ({}, {} bytes)",
                        attachment.name, attachment.media_type, attachment.byte_len
                    ));
                    self.session.stage_attachments(vec![attachment]);
                }
                Err(err) => self.push_system(format!("failed to read {}: {err}", path.display())),
            },
            ChatCommand::ToggleUploader => {
                self.session.toggle_uploader();
                let text = if self.session.uploader_open() {
                    "attachment uploader open"
                } else {
                    "attachment uploader closed"
                };
                self.push_system(text);
            }
            ChatCommand::Cancel => self.push_system("no generation in progress"),
            ChatCommand::Help => {
                for line in chat_help_lines() {
                    self.push_system(line);
                }
            }
            ChatCommand::Invalid(reason) => self.push_system(reason),
            ChatCommand::Exit => {}
        }
    }

    fn cancel_active_turn(&mut self) {
        if let Some(worker) = &self.processing {
            worker.cancel.cancel();
            self.push_system("cancelling…");
        }
    }

    /// A quit with a turn still streaming cancels it and waits briefly so
    /// the child process is reaped before the terminal is restored.
    fn shutdown_active_turn(&mut self) {
        let Some(worker) = self.processing.take() else {
            return;
        };
        worker.cancel.cancel();
        let deadline = Instant::now() + SHUTDOWN_DRAIN_LIMIT;
        while Instant::now() < deadline {
            match worker.event_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(TurnEvent::Done(_)) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Ok(TurnEvent::Chunk(_)) | Err(mpsc::RecvTimeoutError::Timeout) => continue,
            }
        }
    }
}

pub fn run_chat_tui(settings: &Settings) -> Result<(), String> {
    let mut terminal = setup_terminal()?;
    let mut tui = ChatTui::new(settings.clone());

    let result = run_event_loop(&mut terminal, &mut tui);
    tui.shutdown_active_turn();
    teardown_terminal(&mut terminal)?;

    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    tui: &mut ChatTui,
) -> Result<(), String> {
    loop {
        tui.advance_spinner_if_needed();
        tui.advance_cursor_blink_if_needed();
        tui.pump_turn_events();
        draw_chat_ui(terminal, tui)?;

        if !event::poll(UI_POLL_INTERVAL).map_err(|e| format!("failed to poll events: {e}"))? {
            continue;
        }

        let Event::Key(key) = event::read().map_err(|e| format!("failed to read event: {e}"))?
        else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            if tui.processing.is_some() {
                tui.cancel_active_turn();
                continue;
            }
            break;
        }

        match key.code {
            KeyCode::Esc => break,
            KeyCode::Enter => {
                let message = tui.input.trim().to_string();
                tui.input.clear();
                if message.is_empty() {
                    continue;
                }
                match parse_chat_command(&message) {
                    Some(ChatCommand::Exit) => break,
                    Some(ChatCommand::Cancel) if tui.processing.is_some() => {
                        tui.cancel_active_turn();
                    }
                    Some(command) => {
                        if tui.processing.is_some() {
                            tui.push_system("still processing previous request");
                        } else {
                            tui.handle_command(command);
                        }
                    }
                    None => {
                        if tui.processing.is_some() {
                            tui.push_system("still processing previous request");
                            continue;
                        }
                        if let Some(request) = prepare_turn(&tui.session, &message) {
                            tui.start_turn(request);
                            tui.cursor_visible = true;
                            tui.last_cursor_tick = Instant::now();
                        }
                    }
                }
            }
            KeyCode::Backspace => {
                tui.input.pop();
            }
            KeyCode::Char(c) => {
                tui.input.push(c);
            }
            _ => {}
        }
    }

    Ok(())
}

fn draw_chat_ui(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    tui: &ChatTui,
) -> Result<(), String> {
    terminal
        .draw(|frame| {
            let sections = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(8),
                    Constraint::Length(3),
                    Constraint::Length(3),
                ])
                .split(frame.area());

            let header = Paragraph::new(vec![
                Line::raw("chatdeck"),
                Line::raw(format!(
                    "model={} title={}",
                    tui.session.current_model(),
                    tui.session.conversation.title
                )),
            ])
            .block(
                Block::default()
                    .title("Session")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            );
            frame.render_widget(header, sections[0]);

            let mut transcript = tui
                .transcript
                .iter()
                .map(render_chat_line)
                .collect::<Vec<_>>();
            if tui.processing.is_some() && !tui.partial.is_empty() {
                for (index, line) in tui.partial.lines().enumerate() {
                    let prefix = if index == 0 { "assistant> " } else { "" };
                    transcript.push(Line::styled(
                        format!("{prefix}{line}"),
                        Style::default().fg(Color::Green),
                    ));
                }
            }
            let transcript_widget = Paragraph::new(transcript)
                .block(Block::default().title("Transcript").borders(Borders::ALL))
                .wrap(Wrap { trim: false });
            frame.render_widget(transcript_widget, sections[1]);

            let status_widget = Paragraph::new(tui.status_line()).block(
                Block::default()
                    .title("Status")
                    .borders(Borders::ALL)
                    .border_style(if tui.processing.is_some() {
                        Style::default()
                            .fg(Color::Magenta)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    }),
            );
            frame.render_widget(status_widget, sections[2]);

            let input_widget = Paragraph::new(format!("you> {}{}", tui.input, tui.cursor_suffix()))
                .block(Block::default().title("Input").borders(Borders::ALL));
            frame.render_widget(input_widget, sections[3]);
        })
        .map_err(|e| format!("failed to render chat UI: {e}"))?;

    Ok(())
}

fn render_chat_line(line: &ChatLine) -> Line<'static> {
    let text = if line.speaker.is_empty() {
        line.text.clone()
    } else {
        format!("{}> {}", line.speaker, line.text)
    };
    let style = match line.speaker {
        "assistant" => Style::default().fg(Color::Green),
        "you" => Style::default().fg(Color::Yellow),
        "" => Style::default(),
        _ => Style::default().fg(Color::Gray),
    };
    Line::styled(text, style)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, String> {
    enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {e}"))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)
        .map_err(|e| format!("failed to enter alternate screen: {e}"))?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(|e| format!("failed to initialize terminal: {e}"))
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), String> {
    disable_raw_mode().map_err(|e| format!("failed to disable raw mode: {e}"))?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
        .map_err(|e| format!("failed to leave alternate screen: {e}"))?;
    terminal
        .show_cursor()
        .map_err(|e| format!("failed to restore cursor: {e}"))?;
    Ok(())
}
