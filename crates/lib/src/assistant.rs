//! Trading assistant: free text in, answer out. Wraps an [`LlmBackend`] with the system prompt
//! and the market-data tool round.

use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmBackend, LlmError};
use crate::market::MarketDataProvider;
use crate::tools::{execute_market_function, FunctionCatalog};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama3.2:latest";

const SYSTEM_PROMPT: &str = "You are a trading assistant focused on the Deriv trading platform. \
Only answer questions about trading concepts, strategies, market analysis, or the Deriv platform. \
If a question is unrelated to trading or Deriv, politely say you can only help with those topics. \
Keep answers clear and concise.";

const TOOLS_PROMPT: &str = "You have access to real-time market data through functions. \
Call get_price or get_historical_data when the user asks about current or past prices, \
then analyze the data and answer.";

/// What the router needs from a language model.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    /// Plain completion.
    async fn process_text(&self, input: &str) -> Result<String, LlmError>;

    /// Completion that may call the functions in `catalog` against `provider`.
    async fn process_with_functions(
        &self,
        input: &str,
        provider: &dyn MarketDataProvider,
        catalog: &FunctionCatalog,
    ) -> Result<String, LlmError>;
}

pub struct Assistant<B> {
    backend: B,
    model: String,
}

impl<B: LlmBackend> Assistant<B> {
    pub fn new(backend: B, model: impl Into<String>) -> Self {
        let model = model.into().trim().to_string();
        let model = if model.is_empty() {
            log::warn!("assistant: configured model was empty, using {}", DEFAULT_MODEL);
            DEFAULT_MODEL.to_string()
        } else {
            model
        };
        Self { backend, model }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn system_message(extra: Option<&str>) -> ChatMessage {
        let today = chrono::Local::now().format("%Y-%m-%d");
        let mut prompt = format!("{}\nToday is {}.", SYSTEM_PROMPT, today);
        if let Some(extra) = extra {
            prompt.push_str("\n\n");
            prompt.push_str(extra);
        }
        ChatMessage::system(prompt)
    }
}

#[async_trait]
impl<B: LlmBackend> LanguageBackend for Assistant<B> {
    async fn process_text(&self, input: &str) -> Result<String, LlmError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LlmError::EmptyInput);
        }
        let messages = vec![Self::system_message(None), ChatMessage::user(input)];
        let res = self.backend.chat(&self.model, messages, None).await?;
        Ok(res.content().trim().to_string())
    }

    async fn process_with_functions(
        &self,
        input: &str,
        provider: &dyn MarketDataProvider,
        catalog: &FunctionCatalog,
    ) -> Result<String, LlmError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LlmError::EmptyInput);
        }
        if catalog.is_empty() {
            return self.process_text(input).await;
        }

        let mut messages = vec![
            Self::system_message(Some(TOOLS_PROMPT)),
            ChatMessage::user(input),
        ];
        let tools = catalog.definitions().to_vec();
        let first = self
            .backend
            .chat(&self.model, messages.clone(), Some(tools))
            .await?;

        let calls = first.tool_calls().to_vec();
        if calls.is_empty() {
            return Ok(first.content().trim().to_string());
        }

        // One tool round: run every requested call, then ask for the final answer without tools.
        log::debug!("assistant: model requested {} function call(s)", calls.len());
        if let Some(reply) = first.message {
            messages.push(reply);
        }
        for call in &calls {
            if !catalog.contains(&call.function.name) {
                return Err(LlmError::UnknownFunction(call.function.name.clone()));
            }
            let result = execute_market_function(provider, &call.function).await?;
            log::debug!("assistant: {} returned {} bytes", call.function.name, result.len());
            messages.push(ChatMessage::tool_result(&call.function.name, result));
        }

        let last = self.backend.chat(&self.model, messages, None).await?;
        Ok(last.content().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, ToolCall, ToolCallFunction, ToolDefinition};
    use crate::market::{BrokerError, HistoricalDataPoint, HistoricalDataRequest};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<ChatResponse>>,
        seen: Mutex<Vec<(Vec<ChatMessage>, bool)>>,
    }

    impl Scripted {
        fn new(replies: Vec<ChatResponse>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for Scripted {
        async fn chat(
            &self,
            _model: &str,
            messages: Vec<ChatMessage>,
            tools: Option<Vec<ToolDefinition>>,
        ) -> Result<ChatResponse, LlmError> {
            self.seen.lock().unwrap().push((messages, tools.is_some()));
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ChatResponse::assistant("", None)))
        }
    }

    struct FixedPrice;

    #[async_trait]
    impl MarketDataProvider for FixedPrice {
        async fn get_price(&self, _: &str) -> Result<f64, BrokerError> {
            Ok(42.0)
        }
        async fn get_historical_data(
            &self,
            _: &HistoricalDataRequest,
        ) -> Result<Vec<HistoricalDataPoint>, BrokerError> {
            Ok(Vec::new())
        }
    }

    fn tool_call(name: &str) -> ToolCall {
        ToolCall {
            typ: "function".into(),
            function: ToolCallFunction {
                index: None,
                name: name.into(),
                arguments: serde_json::json!({"symbol": "R_50"}),
            },
        }
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_call() {
        let assistant = Assistant::new(Scripted::default(), "m");
        let err = assistant.process_text("   ").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyInput));
        assert!(assistant.backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_without_tool_calls_takes_one_round() {
        let backend = Scripted::new(vec![ChatResponse::assistant(" Volatility is... ", None)]);
        let assistant = Assistant::new(backend, "m");
        let out = assistant
            .process_with_functions("what is volatility?", &FixedPrice, &FunctionCatalog::market_data())
            .await
            .unwrap();
        assert_eq!(out, "Volatility is...");
        let seen = assistant.backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1);
    }

    #[tokio::test]
    async fn tool_result_is_fed_into_second_call() {
        let backend = Scripted::new(vec![
            ChatResponse::assistant("", Some(vec![tool_call("get_price")])),
            ChatResponse::assistant("R_50 trades at 42.", None),
        ]);
        let assistant = Assistant::new(backend, "m");
        let out = assistant
            .process_with_functions("price of R_50?", &FixedPrice, &FunctionCatalog::market_data())
            .await
            .unwrap();
        assert_eq!(out, "R_50 trades at 42.");

        let seen = assistant.backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let (second, with_tools) = &seen[1];
        assert!(!with_tools);
        let last = second.last().unwrap();
        assert_eq!(last.role, "tool");
        assert_eq!(last.content, "Current price for R_50: 42.00");
    }

    #[tokio::test]
    async fn unknown_function_is_an_error() {
        let backend = Scripted::new(vec![ChatResponse::assistant(
            "",
            Some(vec![tool_call("delete_account")]),
        )]);
        let assistant = Assistant::new(backend, "m");
        let err = assistant
            .process_with_functions("do it", &FixedPrice, &FunctionCatalog::market_data())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::UnknownFunction(n) if n == "delete_account"));
    }

    #[test]
    fn blank_model_falls_back() {
        let assistant = Assistant::new(Scripted::default(), "  ");
        assert_eq!(assistant.model(), DEFAULT_MODEL);
    }
}
