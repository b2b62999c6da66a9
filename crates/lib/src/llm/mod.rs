//! LLM backends (Ollama, LM Studio) behind a single chat-completion trait.

mod lm_studio;
mod ollama;
mod types;

pub use lm_studio::{LmStudioClient, LmStudioError, LmStudioModel};
pub use ollama::{OllamaClient, OllamaError, OllamaModel};
pub use types::{
    ChatMessage, ChatResponse, ToolCall, ToolCallFunction, ToolDefinition, ToolFunctionDefinition,
};

use crate::market::BrokerError;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error(transparent)]
    LmStudio(#[from] LmStudioError),
    #[error("input text cannot be empty")]
    EmptyInput,
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },
    #[error("function {name} failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: BrokerError,
    },
}

/// One non-streaming chat completion, optionally advertising tools.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, LlmError>;
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, LlmError> {
        Ok(OllamaClient::chat(self, model, messages, tools).await?)
    }
}

#[async_trait]
impl LlmBackend for LmStudioClient {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, LlmError> {
        Ok(LmStudioClient::chat(self, model, &messages, tools).await?)
    }
}
