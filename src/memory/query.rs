// src/memory/query.rs
// RAG query pipeline: retrieval + context assembly + streamed generation.

use crate::memory::llm_provider::{ChatModel, LLMError, TokenStream};
use crate::memory::vector_store::SearchResult;
use crate::persona::Persona;
use crate::retriever::{IndexCache, IndexError};
use crate::session::Message;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Error, Debug)]
pub enum RagError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    LLM(#[from] LLMError),
}

/// Passage texts separated by a blank line, in rank order.
pub fn assemble_context(passages: &[SearchResult]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `[system(prompt with context)] ++ history ++ [user(question)]`
pub fn build_messages(
    persona: &Persona,
    passages: &[SearchResult],
    history: &[Message],
    question: &str,
) -> Vec<Message> {
    let context = assemble_context(passages);
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(persona.render_system_prompt(&context)));
    messages.extend_from_slice(history);
    messages.push(Message::user(question));
    messages
}

pub struct RagChat {
    index: Arc<IndexCache>,
    model: Arc<dyn ChatModel>,
    persona: Arc<Persona>,
    history_window: usize,
}

impl RagChat {
    pub fn new(
        index: Arc<IndexCache>,
        model: Arc<dyn ChatModel>,
        persona: Arc<Persona>,
        history_window: usize,
    ) -> Self {
        info!(
            llm_model = model.model_name(),
            history_window,
            "Initializing RAG pipeline"
        );
        Self {
            index,
            model,
            persona,
            history_window,
        }
    }

    pub fn index(&self) -> &Arc<IndexCache> {
        &self.index
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Answers `question` given the prior conversation. `history` is trimmed
    /// to the configured window, keeping the most recent messages.
    pub async fn answer(&self, history: &[Message], question: &str) -> Result<TokenStream, RagError> {
        let retriever = self.index.get_or_build().await?;
        let passages = retriever.retrieve(question).await?;
        debug!(passages = passages.len(), "Retrieved context passages");

        let start = history.len().saturating_sub(self.history_window);
        let messages = build_messages(&self.persona, &passages, &history[start..], question);
        info!(
            messages = messages.len(),
            passages = passages.len(),
            "Generating RAG answer"
        );
        Ok(self.model.stream_chat(messages).await?)
    }
}
