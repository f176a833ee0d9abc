// src/chat.rs
// Chat service: sessions, turn handling and the answer engine.

use crate::assistant::AssistantChat;
use crate::config::ChatMode;
use crate::error::ChatError;
use crate::memory::llm_provider::TokenStream;
use crate::memory::query::RagChat;
use crate::monitoring::metrics;
use crate::persona::{Persona, QuickReply};
use crate::session::{ChatSession, Message, SessionStore};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

pub enum ChatEngine {
    Rag(RagChat),
    Assistant(AssistantChat),
}

impl ChatEngine {
    pub fn mode(&self) -> ChatMode {
        match self {
            ChatEngine::Rag(_) => ChatMode::Rag,
            ChatEngine::Assistant(_) => ChatMode::Assistant,
        }
    }
}

fn mode_label(mode: ChatMode) -> &'static str {
    match mode {
        ChatMode::Rag => "rag",
        ChatMode::Assistant => "assistant",
    }
}

/// In-flight turn: forwards tokens and appends the full answer to the
/// session when the stream ends cleanly.
struct Turn {
    inner: TokenStream,
    session: OwnedMutexGuard<ChatSession>,
    answer: String,
    mode: ChatMode,
}

fn completing_stream(turn: Turn) -> TokenStream {
    stream::unfold(Some(turn), |state| async move {
        let mut turn = state?;
        match turn.inner.next().await {
            Some(Ok(token)) => {
                turn.answer.push_str(&token);
                Some((Ok(token), Some(turn)))
            }
            Some(Err(e)) => {
                metrics::record_turn(mode_label(turn.mode), "error");
                error!(session_id = %turn.session.id(), error = %e, "Answer stream failed");
                Some((Err(e), None))
            }
            None => {
                let answer = std::mem::take(&mut turn.answer);
                info!(session_id = %turn.session.id(), answer_len = answer.len(), "Turn complete");
                turn.session.push_assistant(answer);
                metrics::record_turn(mode_label(turn.mode), "ok");
                None
            }
        }
    })
    .boxed()
}

pub struct ChatService {
    persona: Arc<Persona>,
    sessions: SessionStore,
    engine: ChatEngine,
    cancels: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl ChatService {
    pub fn new(persona: Arc<Persona>, engine: ChatEngine) -> Self {
        info!(mode = mode_label(engine.mode()), "Chat service ready");
        Self {
            persona,
            sessions: SessionStore::new(),
            engine,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn mode(&self) -> ChatMode {
        self.engine.mode()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// `Some(ready)` in rag mode; the assistant keeps its index remotely.
    pub fn index_ready(&self) -> Option<bool> {
        match &self.engine {
            ChatEngine::Rag(rag) => Some(rag.index().is_ready()),
            ChatEngine::Assistant(_) => None,
        }
    }

    /// Builds the retrieval index ahead of the first question.
    pub async fn warm_up(&self) -> Result<(), ChatError> {
        if let ChatEngine::Rag(rag) = &self.engine {
            rag.index().get_or_build().await.map_err(|e| self.user_facing(e.into()))?;
        }
        Ok(())
    }

    pub async fn create_session(&self) -> (Uuid, Vec<Message>) {
        let (id, handle) = self.sessions.create(&self.persona);
        let (tx, _rx) = watch::channel(false);
        self.cancels.lock().insert(id, tx);
        metrics::ACTIVE_SESSIONS.inc();
        info!(session_id = %id, "Session created");
        let messages = handle.lock().await.messages().to_vec();
        (id, messages)
    }

    pub async fn messages(&self, id: Uuid) -> Result<Vec<Message>, ChatError> {
        let handle = self.sessions.get(&id).ok_or(ChatError::SessionNotFound(id))?;
        let session = handle.lock().await;
        Ok(session.messages().to_vec())
    }

    /// Drops the session and cancels any assistant run it is waiting on.
    pub fn close_session(&self, id: Uuid) -> Result<(), ChatError> {
        self.sessions.remove(&id).ok_or(ChatError::SessionNotFound(id))?;
        if let Some(cancel) = self.cancels.lock().remove(&id) {
            cancel.send_replace(true);
        }
        metrics::ACTIVE_SESSIONS.dec();
        info!(session_id = %id, "Session closed");
        Ok(())
    }

    pub fn quick_replies(&self) -> &[QuickReply] {
        &self.persona.menu
    }

    /// Asks the canned question behind quick-reply button `index`.
    pub async fn quick_reply(&self, id: Uuid, index: usize) -> Result<TokenStream, ChatError> {
        let question = self
            .persona
            .quick_reply(index)
            .ok_or(ChatError::InvalidQuickReply(index))?
            .question
            .clone();
        self.submit(id, &question).await
    }

    /// Appends `text` as a user message and starts answering it.
    ///
    /// The session stays locked until the returned stream ends, so turns of
    /// one session never interleave. The answer is appended only if the
    /// stream completes without error.
    pub async fn submit(&self, id: Uuid, text: &str) -> Result<TokenStream, ChatError> {
        let mode = self.engine.mode();
        let handle = self.sessions.get(&id).ok_or(ChatError::SessionNotFound(id))?;
        let mut session = handle.lock_owned().await;

        if let Err(e) = session.push_user(text) {
            metrics::record_turn(mode_label(mode), "rejected");
            return Err(e.into());
        }
        info!(session_id = %id, mode = mode_label(mode), "User message received");

        let started = match &self.engine {
            ChatEngine::Rag(rag) => {
                let history = session.history_window(rag.history_window());
                rag.answer(&history, text).await.map_err(ChatError::from)
            }
            ChatEngine::Assistant(assistant) => {
                let cancel = self.cancel_receiver(id)?;
                assistant.answer(&mut session, text, cancel).await.map_err(ChatError::from)
            }
        };

        match started {
            Ok(inner) => Ok(completing_stream(Turn {
                inner,
                session,
                answer: String::new(),
                mode,
            })),
            Err(e) => {
                metrics::record_turn(mode_label(mode), "error");
                warn!(session_id = %id, error = %e, "Turn failed");
                Err(self.user_facing(e))
            }
        }
    }

    fn cancel_receiver(&self, id: Uuid) -> Result<watch::Receiver<bool>, ChatError> {
        self.cancels
            .lock()
            .get(&id)
            .map(watch::Sender::subscribe)
            .ok_or(ChatError::SessionNotFound(id))
    }

    fn user_facing(&self, err: ChatError) -> ChatError {
        match err {
            ChatError::NoDocuments(_) => ChatError::NoDocuments(self.persona.missing_documents_message.clone()),
            other => other,
        }
    }
}
