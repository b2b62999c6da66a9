//! LM Studio client over its OpenAI-compatible API (/v1/models, /v1/chat/completions).
//! Tool definitions are forwarded in OpenAI format and tool calls mapped back.

use crate::llm::types::{ChatMessage, ChatResponse, ToolCall, ToolCallFunction, ToolDefinition};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:1234/v1";

#[derive(Clone)]
pub struct LmStudioClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum LmStudioError {
    #[error("lm studio request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("lm studio api error: {0}")]
    Api(String),
}

impl LmStudioClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// GET /v1/models: list available models.
    pub async fn list_models(&self) -> Result<Vec<LmStudioModel>, LmStudioError> {
        let url = format!("{}/models", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LmStudioError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiModelsResponse = res.json().await?;
        Ok(data
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|m| LmStudioModel { name: m.id })
            .collect())
    }

    /// POST /v1/chat/completions: non-streaming chat with optional tools.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, LmStudioError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: model.to_string(),
            messages: messages_to_openai(messages),
            stream: false,
            tools: tools.map(tool_definitions_to_openai),
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LmStudioError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await?;
        Ok(openai_response_to_chat_response(data))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LmStudioModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelsResponse {
    data: Option<Vec<OpenAiModelObject>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
enum OpenAiMessage {
    System { content: String },
    User { content: String },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAiToolCallRef>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct OpenAiToolCallRef {
    id: String,
    #[serde(rename = "type")]
    typ: String,
    function: OpenAiToolCallFunctionRef,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCallFunctionRef {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    typ: String,
    function: OpenAiToolFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiToolFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

/// Convert internal messages to OpenAI format. Tool call ids are assigned per assistant message
/// and matched to the following tool messages in order.
fn messages_to_openai(messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len());
    let mut pending_ids: Vec<String> = Vec::new();
    let mut next_id = 0;

    for m in messages {
        match m.role.as_str() {
            "system" => out.push(OpenAiMessage::System {
                content: m.content.clone(),
            }),
            "assistant" => {
                let tool_calls = m.tool_calls.as_ref().map(|tcs| {
                    pending_ids.clear();
                    tcs.iter()
                        .map(|tc| {
                            let id = format!("call_{}", next_id);
                            next_id += 1;
                            pending_ids.push(id.clone());
                            OpenAiToolCallRef {
                                id,
                                typ: "function".to_string(),
                                function: OpenAiToolCallFunctionRef {
                                    name: tc.function.name.clone(),
                                    arguments: serde_json::to_string(&tc.function.arguments)
                                        .unwrap_or_else(|_| "{}".to_string()),
                                },
                            }
                        })
                        .collect()
                });
                out.push(OpenAiMessage::Assistant {
                    content: m.content.clone(),
                    tool_calls,
                });
            }
            "tool" => {
                let tool_call_id = if pending_ids.is_empty() {
                    let fallback = format!("call_{}", next_id);
                    next_id += 1;
                    fallback
                } else {
                    pending_ids.remove(0)
                };
                out.push(OpenAiMessage::Tool {
                    tool_call_id,
                    content: m.content.clone(),
                });
            }
            _ => {
                pending_ids.clear();
                out.push(OpenAiMessage::User {
                    content: m.content.clone(),
                });
            }
        }
    }
    out
}

fn tool_definitions_to_openai(tools: Vec<ToolDefinition>) -> Vec<OpenAiTool> {
    tools
        .into_iter()
        .map(|t| OpenAiTool {
            typ: t.typ,
            function: OpenAiToolFunction {
                name: t.function.name,
                description: t.function.description,
                parameters: t.function.parameters,
            },
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseToolCall {
    #[serde(rename = "type")]
    typ: Option<String>,
    function: Option<OpenAiResponseToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseToolCallFunction {
    name: Option<String>,
    arguments: Option<String>,
}

fn openai_response_to_chat_response(data: OpenAiChatResponse) -> ChatResponse {
    let Some(message) = data
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
    else {
        return ChatResponse::assistant("", None);
    };
    let tool_calls = message.tool_calls.map(|tcs| {
        tcs.into_iter()
            .filter_map(|tc| {
                let function = tc.function?;
                let name = function.name?;
                let arguments = function
                    .arguments
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or(serde_json::Value::Null);
                Some(ToolCall {
                    typ: tc.typ.unwrap_or_else(|| "function".to_string()),
                    function: ToolCallFunction {
                        index: None,
                        name,
                        arguments,
                    },
                })
            })
            .collect::<Vec<_>>()
    });
    let tool_calls = tool_calls.filter(|t| !t.is_empty());
    ChatResponse::assistant(message.content.unwrap_or_default(), tool_calls)
}
