// nuri/src/main.rs
use nuri::api::start_api_server;
use nuri::assistant::{AssistantChat, AzureAssistantClient};
use nuri::config::ApiConfig;
use nuri::embedder::AzureEmbedder;
use nuri::memory::llm_provider::AzureChatProvider;
use nuri::memory::query::RagChat;
use nuri::monitoring::health::{Component, ComponentStatus};
use nuri::monitoring::{MonitoringConfig, MonitoringContext};
use nuri::persona::Persona;
use nuri::{ChatEngine, ChatError, ChatService, IndexCache};
use std::sync::Arc;
use tracing::{error, info};

fn invalid(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let monitoring = MonitoringContext::new(MonitoringConfig::from_env()).map_err(invalid)?;
    let config = ApiConfig::from_env().map_err(invalid)?;

    let persona = match &config.persona_file {
        Some(path) => Persona::from_file(path).map_err(invalid)?,
        None => Persona::nuri(),
    };
    let persona = Arc::new(persona);
    info!(title = %persona.page_title, mode = ?config.mode, "Loaded persona");

    let engine = match &config.assistant {
        Some(settings) => {
            let client = Arc::new(AzureAssistantClient::new(&config.azure, settings));
            monitoring.health.set_component_status(Component::Knowledge, ComponentStatus::Healthy);
            ChatEngine::Assistant(AssistantChat::new(client, settings))
        }
        None => {
            let embedder = Arc::new(AzureEmbedder::new(&config.azure, config.rag.embedding_batch_size));
            let index = Arc::new(IndexCache::new(config.rag.clone(), embedder));
            let model = Arc::new(AzureChatProvider::new(&config.azure));
            ChatEngine::Rag(RagChat::new(index, model, Arc::clone(&persona), config.rag.history_window))
        }
    };
    let chat = Arc::new(ChatService::new(persona, engine));

    if config.assistant.is_none() && config.rag.warmup {
        let chat = Arc::clone(&chat);
        let health = Arc::clone(&monitoring.health);
        tokio::spawn(async move {
            match chat.warm_up().await {
                Ok(()) => health.set_component_status(Component::Knowledge, ComponentStatus::Healthy),
                Err(ChatError::NoDocuments(message)) => {
                    error!("Index warm-up found no documents");
                    health.set_message(Some(message));
                }
                Err(e) => {
                    error!(error = %e, "Index warm-up failed");
                    health.set_component_status(Component::Knowledge, ComponentStatus::Unhealthy);
                    health.set_message(Some(e.to_string()));
                }
            }
        });
    }

    let server = start_api_server(&config, chat, Arc::clone(&monitoring.health))?;
    monitoring.startup_complete();
    server.await
}
