use chrono::{DateTime, Local};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub byte_len: u64,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            byte_len: bytes.len() as u64,
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = media_type_for_path(path);
        Ok(Self::from_bytes(name, media_type, bytes))
    }
}

fn media_type_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// One utterance. Never mutated after creation; conversations only append
/// pairs or bulk-replace on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub model: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub title: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    fn new_titled_from(now: DateTime<Local>) -> Self {
        Self {
            title: derive_title(now),
            messages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub fn derive_title(now: DateTime<Local>) -> String {
    now.format("Chat %b %d, %I:%M %p").to_string()
}

/// Session-scoped state, exclusively owned by the running UI session. All
/// mutation goes through the named operations below.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub conversation: Conversation,
    pub history: Vec<crate::history::HistoryEntry>,
    current_model: String,
    uploader_open: bool,
    staged_attachments: Vec<Attachment>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            conversation: Conversation::new_titled_from(Local::now()),
            history: Vec::new(),
            current_model: String::new(),
            uploader_open: false,
            staged_attachments: Vec::new(),
        }
    }

    pub fn current_model(&self) -> &str {
        &self.current_model
    }

    /// No validation here; callers re-check the name against the runner's
    /// listing each render cycle since installed models change out of band.
    pub fn set_current_model(&mut self, name: impl Into<String>) {
        self.current_model = name.into();
    }

    /// Appends exactly one user/assistant pair, stamped with the same
    /// timestamp and the currently selected model. The sole mutation path
    /// for conversation turns.
    pub fn append_exchange(
        &mut self,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) {
        let stamp = Local::now();
        let model = self.current_model.clone();
        self.conversation.messages.push(Message {
            role: Role::User,
            content: user_text.into(),
            timestamp: stamp,
            model: model.clone(),
            attachments,
        });
        self.conversation.messages.push(Message {
            role: Role::Assistant,
            content: assistant_text.into(),
            timestamp: stamp,
            model,
            attachments: Vec::new(),
        });
    }

    pub fn uploader_open(&self) -> bool {
        self.uploader_open
    }

    pub fn toggle_uploader(&mut self) {
        self.uploader_open = !self.uploader_open;
    }

    pub fn staged_attachments(&self) -> &[Attachment] {
        &self.staged_attachments
    }

    pub fn stage_attachments(&mut self, attachments: Vec<Attachment>) {
        self.staged_attachments.extend(attachments);
    }

    pub fn clear_staged_attachments(&mut self) {
        self.staged_attachments.clear();
    }

    pub(crate) fn reset_conversation(&mut self) {
        self.conversation = Conversation::new_titled_from(Local::now());
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_state_starts_empty_with_derived_title() {
        let state = SessionState::new();
        assert!(state.conversation.is_empty());
        assert!(state.history.is_empty());
        assert_eq!(state.current_model(), "");
        assert!(!state.uploader_open());
        assert!(state.staged_attachments().is_empty());
        assert!(state.conversation.title.starts_with("Chat "));
    }

    #[test]
    fn derived_title_formats_creation_time() {
        let stamp = Local.with_ymd_and_hms(2025, 8, 5, 14, 30, 0).unwrap();
        assert_eq!(derive_title(stamp), "Chat Aug 05, 02:30 PM");
    }

    #[test]
    fn append_exchange_adds_an_atomic_pair() {
        let mut state = SessionState::new();
        state.set_current_model("llama3");
        state.append_exchange("hello", "hi there", Vec::new());

        assert_eq!(state.conversation.messages.len(), 2);
        let user = &state.conversation.messages[0];
        let assistant = &state.conversation.messages[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(user.timestamp, assistant.timestamp);
        assert_eq!(user.model, "llama3");
        assert_eq!(assistant.model, "llama3");
        assert_eq!(user.content, "hello");
        assert_eq!(assistant.content, "hi there");
    }

    #[test]
    fn attachments_ride_on_the_user_message_only() {
        let mut state = SessionState::new();
        state.set_current_model("llama3");
        let attachment = Attachment::from_bytes("notes.txt", "text/plain", b"abc".to_vec());
        state.append_exchange("see attached", "ok", vec![attachment.clone()]);

        assert_eq!(state.conversation.messages[0].attachments, vec![attachment]);
        assert!(state.conversation.messages[1].attachments.is_empty());
    }

    #[test]
    fn staged_attachments_accumulate_until_cleared() {
        let mut state = SessionState::new();
        state.stage_attachments(vec![Attachment::from_bytes(
            "a.txt",
            "text/plain",
            b"a".to_vec(),
        )]);
        state.stage_attachments(vec![Attachment::from_bytes(
            "b.txt",
            "text/plain",
            b"b".to_vec(),
        )]);
        assert_eq!(state.staged_attachments().len(), 2);
        state.clear_staged_attachments();
        assert!(state.staged_attachments().is_empty());
    }

    #[test]
    fn uploader_flag_toggles() {
        let mut state = SessionState::new();
        state.toggle_uploader();
        assert!(state.uploader_open());
        state.toggle_uploader();
        assert!(!state.uploader_open());
    }

    #[test]
    fn media_types_follow_extensions() {
        assert_eq!(media_type_for_path(Path::new("a/notes.TXT")), "text/plain");
        assert_eq!(media_type_for_path(Path::new("img.png")), "image/png");
        assert_eq!(
            media_type_for_path(Path::new("mystery.bin")),
            "application/octet-stream"
        );
        assert_eq!(
            media_type_for_path(Path::new("no_extension")),
            "application/octet-stream"
        );
    }
}
