//! Per-session chat history
//!
//! Sessions are keyed by the `nexus_session` cookie; requests without one
//! share the `default` session.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SESSION_COOKIE: &str = "nexus_session";
pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: HashMap<String, Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a session's history (empty if the session is new)
    pub fn history(&self, session: &str) -> Vec<ChatMessage> {
        self.sessions.get(session).cloned().unwrap_or_default()
    }

    /// Record a completed exchange; returns the new history length
    pub fn record_exchange(&mut self, session: &str, query: String, reply: String) -> usize {
        let history = self.sessions.entry(session.to_string()).or_default();
        history.push(ChatMessage::user(query));
        history.push(ChatMessage::assistant(reply));
        history.len()
    }

    pub fn clear(&mut self, session: &str) {
        self.sessions.insert(session.to_string(), Vec::new());
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Session id from a raw `Cookie` header value
pub fn session_from_cookie(cookie_header: Option<&str>) -> String {
    cookie_header
        .into_iter()
        .flat_map(|h| h.split(';'))
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string())
}
