use crate::session::{Message, SessionState};
use std::time::{SystemTime, UNIX_EPOCH};

/// An archived conversation. Immutable once created; restoring copies it
/// back into the active conversation without consuming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub model: String,
}

impl SessionState {
    /// Snapshots a non-empty active conversation into history, then starts
    /// a fresh one titled from the current time. An empty conversation is
    /// not archived but still gets the fresh title. The only way a
    /// conversation enters history and the only way the active one is
    /// cleared. Oldest entries are evicted beyond `history_limit`.
    pub fn archive_and_reset(&mut self, history_limit: usize) -> Option<String> {
        let archived_id = if self.conversation.is_empty() {
            None
        } else {
            let entry = HistoryEntry {
                id: new_entry_id(),
                title: self.conversation.title.clone(),
                messages: self.conversation.messages.clone(),
                model: self.current_model().to_string(),
            };
            let id = entry.id.clone();
            self.history.push(entry);
            if self.history.len() > history_limit {
                let excess = self.history.len() - history_limit;
                self.history.drain(..excess);
            }
            Some(id)
        };
        self.reset_conversation();
        archived_id
    }

    /// Copies an archived conversation back into the active one, restoring
    /// its title and recorded model. The entry stays in history, unchanged
    /// and restorable again. Returns false for an unknown id.
    pub fn restore(&mut self, entry_id: &str) -> bool {
        let Some(entry) = self.history.iter().find(|entry| entry.id == entry_id) else {
            return false;
        };
        let title = entry.title.clone();
        let messages = entry.messages.clone();
        let model = entry.model.clone();
        self.conversation.title = title;
        self.conversation.messages = messages;
        self.set_current_model(model);
        true
    }
}

fn new_entry_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0);
    format!("hist-{nanos}")
}
