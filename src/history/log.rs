//! The conversation log: an append-only arena of messages linked by parent id.
//!
//! Messages are immutable once appended (the compression engine's overwrite
//! of tool-result content is the single sanctioned exception). The log keeps
//! an id index so `active_path` walks are O(path length), and notifies an
//! optional observer on every append so a persistence layer can mirror the
//! log without the core knowing its storage format.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::{CoreError, Result};

use super::types::{Message, MessageId, Role, TokenUsage};

/// Observer notified of every message appended to a [`HistoryLog`].
///
/// Implementations are expected to be append-only, one record per message,
/// keyed by session id. A failing sink is logged and ignored — persistence
/// problems must not take the conversation down.
pub trait HistorySink: Send + Sync {
    /// Called after a message has been appended to the log.
    fn on_message(&self, session_id: &str, message: &Message) -> Result<()>;
}

/// The conversation log for one session.
///
/// # Example
///
/// ```
/// use clawcore::history::{HistoryLog, Message};
///
/// let mut log = HistoryLog::new();
/// log.add_message(Message::system("You are a coding agent.")).unwrap();
/// log.add_message(Message::user("Hello!")).unwrap();
///
/// let path = log.active_messages().unwrap();
/// assert_eq!(path.len(), 2);
/// ```
pub struct HistoryLog {
    /// Session identifier, passed through to the sink
    session_id: String,
    /// Messages in insertion order
    arena: Vec<Message>,
    /// Message id -> arena index
    index: HashMap<MessageId, usize>,
    /// Id of the newest message
    head: Option<MessageId>,
    /// Optional persistence observer
    sink: Option<Arc<dyn HistorySink>>,
}

impl HistoryLog {
    /// Create a new empty log with a generated session id.
    pub fn new() -> Self {
        Self::with_session_id(&uuid::Uuid::new_v4().to_string())
    }

    /// Create a new empty log with an explicit session id.
    pub fn with_session_id(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            arena: Vec::new(),
            index: HashMap::new(),
            head: None,
            sink: None,
        }
    }

    /// Attach a persistence observer. Replaces any previous sink.
    pub fn with_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The session id of this log.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a message to the log.
    ///
    /// When the message carries no parent id, it is auto-linked as a child
    /// of the current newest message (or becomes the root of an empty log).
    /// An explicit parent id must resolve within this log.
    ///
    /// Returns the id of the appended message.
    ///
    /// # Errors
    /// - `CoreError::History` if the explicit parent id is unknown, if the
    ///   id is already present, or if a second root is being added.
    pub fn add_message(&mut self, mut message: Message) -> Result<MessageId> {
        if self.index.contains_key(&message.id) {
            return Err(CoreError::History(format!(
                "duplicate message id: {}",
                message.id
            )));
        }

        match &message.parent {
            Some(parent) => {
                if !self.index.contains_key(parent) {
                    return Err(CoreError::History(format!(
                        "parent id not found: {}",
                        parent
                    )));
                }
            }
            None => {
                // Auto-link to the newest message; the first message is the root.
                message.parent = self.head.clone();
            }
        }

        let id = message.id.clone();
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.on_message(&self.session_id, &message) {
                warn!(session_id = %self.session_id, error = %e, "History sink failed");
            }
        }
        self.index.insert(id.clone(), self.arena.len());
        self.arena.push(message);
        self.head = Some(id.clone());
        Ok(id)
    }

    /// Get a message by id.
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&i| &self.arena[i])
    }

    /// The newest message, if any.
    pub fn head(&self) -> Option<&Message> {
        self.head.as_deref().and_then(|id| self.get(id))
    }

    /// Number of messages in the log (including unreachable branches).
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// All messages in insertion order, including unreachable branches.
    pub fn messages(&self) -> &[Message] {
        &self.arena
    }

    /// The path from the root to the message with the given id, following
    /// parent links. Every ancestor is visited exactly once.
    ///
    /// # Errors
    /// - `CoreError::History` if the id (or any parent link) is unknown.
    pub fn active_path(&self, id: &str) -> Result<Vec<&Message>> {
        let mut path = Vec::new();
        let mut current = Some(id.to_string());

        while let Some(cur) = current {
            let msg = self
                .get(&cur)
                .ok_or_else(|| CoreError::History(format!("message id not found: {}", cur)))?;
            path.push(msg);
            // A parent chain longer than the arena means a cycle; the append
            // rules make that impossible, but fail loudly rather than spin.
            if path.len() > self.arena.len() {
                return Err(CoreError::History("parent links form a cycle".into()));
            }
            current = msg.parent.clone();
        }

        path.reverse();
        Ok(path)
    }

    /// The active path ending at the newest message. Empty log yields an
    /// empty path.
    pub fn active_messages(&self) -> Result<Vec<&Message>> {
        match &self.head {
            Some(id) => self.active_path(id),
            None => Ok(Vec::new()),
        }
    }

    /// Token usage of the most recent assistant message on the active path.
    pub fn last_assistant_usage(&self) -> Option<TokenUsage> {
        let path = self.active_messages().ok()?;
        path.iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.usage)
    }

    /// Accumulated usage of every assistant message on the active path.
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        if let Ok(path) = self.active_messages() {
            for msg in path {
                if let Some(usage) = &msg.usage {
                    total.accumulate(usage);
                }
            }
        }
        total
    }

    /// Replace the entire log with a single message.
    ///
    /// Used by compaction: the summary becomes the new root. The sink is
    /// notified of the replacement message like any other append.
    pub fn reset_to(&mut self, message: Message) -> Result<MessageId> {
        self.arena.clear();
        self.index.clear();
        self.head = None;
        let mut message = message;
        message.parent = None;
        self.add_message(message)
    }

    /// Mutable access to the arena for the compression engine.
    pub(crate) fn arena_mut(&mut self) -> &mut [Message] {
        &mut self.arena
    }

    /// Arena indices of the active path, newest first. Used by the pruning
    /// scan, which walks backwards in time.
    pub(crate) fn active_indices_newest_first(&self) -> Vec<usize> {
        let mut indices = Vec::new();
        let mut current = self.head.clone();
        while let Some(id) = current {
            match self.index.get(&id) {
                Some(&i) => {
                    indices.push(i);
                    current = self.arena[i].parent.clone();
                }
                None => break,
            }
        }
        indices
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}
