use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::Utc;
use uuid::Uuid;

use crate::prompt::ChatMessage;

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub expires_at: i64,
    pub history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now().timestamp()
    }
}

/// Per-session conversation history, held in memory with a sliding TTL.
#[derive(Debug, Clone)]
pub struct ChatSessionStore {
    inner: Arc<RwLock<HashMap<Uuid, ChatSession>>>,
    ttl_secs: i64,
    max_history_turns: usize,
}

impl ChatSessionStore {
    pub fn new(ttl_secs: i64, max_history_turns: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
            max_history_turns,
        }
    }

    /// Empty for unknown or expired sessions.
    pub fn load_history(&self, session_id: Uuid) -> Vec<ChatMessage> {
        self.inner
            .read()
            .unwrap()
            .get(&session_id)
            .filter(|s| !s.is_expired())
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Appends one user/assistant exchange, dropping the oldest exchanges past
    /// the configured bound.
    pub fn record_turn(&self, session_id: Uuid, user: ChatMessage, assistant: ChatMessage) {
        let expires_at = Utc::now().timestamp() + self.ttl_secs;
        let mut sessions = self.inner.write().unwrap();
        let session = sessions.entry(session_id).or_insert_with(|| ChatSession {
            expires_at,
            history: Vec::new(),
        });

        if session.is_expired() {
            session.history.clear();
        }
        session.expires_at = expires_at;
        session.history.push(user);
        session.history.push(assistant);

        let max_messages = self.max_history_turns * 2;
        if session.history.len() > max_messages {
            let excess = session.history.len() - max_messages;
            session.history.drain(..excess);
        }
    }

    pub fn destroy_session(&self, session_id: Uuid) {
        self.inner.write().unwrap().remove(&session_id);
    }

    pub fn clean_store(&self) {
        let now = Utc::now().timestamp();
        self.inner
            .write()
            .unwrap()
            .retain(|_, session| session.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}
