pub mod api;
pub mod assistant;
pub mod chat;
pub mod config;
pub mod embedder;
pub mod error;
pub mod memory;
pub mod monitoring;
pub mod parser;
pub mod pdf;
pub mod persona;
pub mod retriever;
pub mod session;

pub use chat::{ChatEngine, ChatService};
pub use error::ChatError;
pub use retriever::{IndexCache, Retriever};
