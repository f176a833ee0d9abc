// src/session.rs
// Per-session chat log and the in-memory session registry.

use crate::persona::Persona;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Message content is empty")]
    EmptyInput,
    #[error("Session already bound to thread {0}")]
    ThreadAlreadyBound(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    id: Uuid,
    messages: Vec<Message>,
    thread_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl ChatSession {
    /// New session whose log starts with the persona's welcome message.
    pub fn new(persona: &Persona) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: vec![Message::assistant(persona.welcome.clone())],
            thread_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, content: &str) -> Result<(), SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.messages.push(Message::user(content));
        Ok(())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Up to `n` messages preceding the most recent one.
    ///
    /// Called after the current question was pushed, so the question itself
    /// is excluded and is sent separately as the final user turn.
    pub fn history_window(&self, n: usize) -> Vec<Message> {
        let prior = self.messages.len().saturating_sub(1);
        let start = prior.saturating_sub(n);
        self.messages[start..prior].to_vec()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn bind_thread(&mut self, thread_id: impl Into<String>) -> Result<(), SessionError> {
        let thread_id = thread_id.into();
        match &self.thread_id {
            Some(existing) if *existing != thread_id => {
                Err(SessionError::ThreadAlreadyBound(existing.clone()))
            }
            _ => {
                self.thread_id = Some(thread_id);
                Ok(())
            }
        }
    }
}

pub type SessionHandle = Arc<Mutex<ChatSession>>;

/// Registry of live sessions. Each session is behind its own async mutex so
/// turns of one session are serialized while other sessions proceed.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, persona: &Persona) -> (Uuid, SessionHandle) {
        let session = ChatSession::new(persona);
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().insert(id, Arc::clone(&handle));
        (id, handle)
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
