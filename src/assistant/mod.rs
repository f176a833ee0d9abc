// src/assistant/mod.rs
// Hosted-assistant chat: one remote thread per session, one run per turn.

pub mod client;
pub mod run;

pub use client::{AssistantApi, AssistantError, AzureAssistantClient, Run, RunStatus};
pub use run::{wait_for_run, PollSettings};

use crate::config::AssistantSettings;
use crate::memory::llm_provider::{single_token_stream, TokenStream};
use crate::monitoring::metrics;
use crate::session::ChatSession;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct AssistantChat {
    api: Arc<dyn AssistantApi>,
    poll: PollSettings,
}

impl AssistantChat {
    pub fn new(api: Arc<dyn AssistantApi>, settings: &AssistantSettings) -> Self {
        Self {
            api,
            poll: PollSettings {
                interval: settings.poll_interval,
                timeout: settings.run_timeout,
            },
        }
    }

    /// The session's thread, created on first use.
    async fn thread_for(&self, session: &mut ChatSession) -> Result<String, AssistantError> {
        if let Some(thread_id) = session.thread_id() {
            return Ok(thread_id.to_string());
        }
        let thread_id = self.api.create_thread().await?;
        session.bind_thread(thread_id.clone())?;
        metrics::ASSISTANT_THREADS_TOTAL.inc();
        info!(session_id = %session.id(), thread_id = %thread_id, "Bound assistant thread");
        Ok(thread_id)
    }

    /// Posts `question` to the session's thread and waits for the run.
    /// The reply arrives whole, as a one-item stream.
    pub async fn answer(
        &self,
        session: &mut ChatSession,
        question: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<TokenStream, AssistantError> {
        let thread_id = self.thread_for(session).await?;
        self.api.create_message(&thread_id, question).await?;
        let run = self.api.create_run(&thread_id).await?;
        wait_for_run(self.api.as_ref(), &thread_id, &run.id, self.poll, &mut cancel).await?;

        let reply = self
            .api
            .latest_message(&thread_id)
            .await?
            .ok_or(AssistantError::EmptyReply)?;
        Ok(single_token_stream(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Persona;
    use futures_util::StreamExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct EchoAssistant {
        threads: AtomicUsize,
        posted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl AssistantApi for EchoAssistant {
        async fn create_thread(&self) -> Result<String, AssistantError> {
            let n = self.threads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("thread_{}", n))
        }
        async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
            self.posted.lock().push((thread_id.to_string(), content.to_string()));
            Ok(())
        }
        async fn create_run(&self, _: &str) -> Result<Run, AssistantError> {
            Ok(Run { id: "run".into(), status: RunStatus::Queued, last_error: None })
        }
        async fn retrieve_run(&self, _: &str, run_id: &str) -> Result<Run, AssistantError> {
            Ok(Run { id: run_id.into(), status: RunStatus::Completed, last_error: None })
        }
        async fn cancel_run(&self, _: &str, _: &str) -> Result<(), AssistantError> {
            Ok(())
        }
        async fn latest_message(&self, thread_id: &str) -> Result<Option<String>, AssistantError> {
            let posted = self.posted.lock();
            Ok(posted
                .iter()
                .rev()
                .find(|(t, _)| t == thread_id)
                .map(|(_, q)| format!("답: {}", q)))
        }
    }

    fn settings() -> AssistantSettings {
        AssistantSettings {
            assistant_id: "asst".into(),
            vector_store_id: None,
            poll_interval: Duration::from_millis(5),
            run_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_one_thread_per_session() {
        let api = Arc::new(EchoAssistant::default());
        let chat = AssistantChat::new(api.clone(), &settings());
        let persona = Persona::nuri();
        let mut first = ChatSession::new(&persona);
        let mut second = ChatSession::new(&persona);
        let (_tx, rx) = watch::channel(false);

        for q in ["1차 발사?", "2차 발사?"] {
            let mut stream = chat.answer(&mut first, q, rx.clone()).await.unwrap();
            assert_eq!(stream.next().await.unwrap().unwrap(), format!("답: {}", q));
        }
        chat.answer(&mut second, "3차?", rx.clone()).await.unwrap();

        assert_eq!(api.threads.load(Ordering::SeqCst), 2);
        assert_eq!(first.thread_id(), Some("thread_0"));
        assert_eq!(second.thread_id(), Some("thread_1"));
        let posted = api.posted.lock();
        assert_eq!(posted[0].0, posted[1].0);
    }
}
