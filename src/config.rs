// src/config.rs
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "ada";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which integration style answers the questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Local retrieval over the PDF corpus, then a streamed completion.
    Rag,
    /// Hosted assistant with server-side thread state.
    Assistant,
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rag" | "retrieval" => Ok(ChatMode::Rag),
            "assistant" => Ok(ChatMode::Assistant),
            _ => Err(format!("Unknown chat mode: {}", s)),
        }
    }
}

/// Credentials and deployment names of the hosted model provider.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub endpoint: String,
    pub api_key: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub data_dir: PathBuf,
    pub vectorstore_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub history_window: usize,
    pub embedding_batch_size: usize,
    pub warmup: bool,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/"),
            vectorstore_dir: PathBuf::from("./vectorstore"),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 6,
            history_window: 10,
            embedding_batch_size: 16,
            warmup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub assistant_id: String,
    pub vector_store_id: Option<String>,
    pub poll_interval: Duration,
    pub run_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub mode: ChatMode,
    pub azure: AzureConfig,
    pub rag: RagSettings,
    /// Only present in assistant mode.
    pub assistant: Option<AssistantSettings>,
    pub persona_file: Option<PathBuf>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let host = get("BACKEND_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&get, "BACKEND_PORT", 3010u16)?;
        let mode = match get("CHAT_MODE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "CHAT_MODE",
                value: raw,
            })?,
            None => ChatMode::Rag,
        };

        let endpoint = required("AZURE_OAI_ENDPOINT")?
            .trim()
            .trim_end_matches('/')
            .to_string();
        let api_key = required("AZURE_OAI_KEY")?;
        let chat_deployment = match mode {
            ChatMode::Rag => required("AZURE_OAI_DEPLOYMENT")?,
            ChatMode::Assistant => get("AZURE_OAI_DEPLOYMENT").unwrap_or_default(),
        };
        let azure = AzureConfig {
            endpoint,
            api_key,
            chat_deployment,
            embedding_deployment: get("AZURE_OAI_EMBEDDING_DEPLOYMENT")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_DEPLOYMENT.to_string()),
            api_version: get("AZURE_OAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            temperature: parse_or(&get, "LLM_TEMPERATURE", 0.3f32)?,
            max_tokens: parse_or(&get, "LLM_MAX_TOKENS", 1000u32)?,
        };

        let defaults = RagSettings::default();
        let rag = RagSettings {
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            vectorstore_dir: get("VECTORSTORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.vectorstore_dir),
            chunk_size: parse_or(&get, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: parse_or(&get, "RETRIEVAL_TOP_K", defaults.top_k)?,
            history_window: parse_or(&get, "HISTORY_WINDOW", defaults.history_window)?,
            embedding_batch_size: parse_or(
                &get,
                "EMBEDDING_BATCH_SIZE",
                defaults.embedding_batch_size,
            )?,
            warmup: parse_bool_or(&get, "INDEX_WARMUP", defaults.warmup)?,
        };
        if rag.chunk_size == 0 || rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::Invalid {
                key: "CHUNK_OVERLAP",
                value: format!("{} (chunk size {})", rag.chunk_overlap, rag.chunk_size),
            });
        }
        if rag.top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "RETRIEVAL_TOP_K",
                value: rag.top_k.to_string(),
            });
        }
        if rag.embedding_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "EMBEDDING_BATCH_SIZE",
                value: rag.embedding_batch_size.to_string(),
            });
        }

        let assistant = match mode {
            ChatMode::Assistant => Some(AssistantSettings {
                assistant_id: required("AZURE_ASSISTANT_ID")?,
                vector_store_id: get("AZURE_VECTOR_STORE_ID"),
                poll_interval: Duration::from_millis(parse_or(&get, "RUN_POLL_INTERVAL_MS", 1000u64)?),
                run_timeout: Duration::from_secs(parse_or(&get, "RUN_TIMEOUT_SECS", 120u64)?),
            }),
            ChatMode::Rag => None,
        };

        Ok(Self {
            host,
            port,
            mode,
            azure,
            rag,
            assistant,
            persona_file: get("PERSONA_FILE").map(PathBuf::from),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: raw }),
        },
        None => Ok(default),
    }
}
