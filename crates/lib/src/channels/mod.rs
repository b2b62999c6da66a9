//! Chat transport: Telegram Bot API adapter plus the per-chat dispatcher that feeds the router.

mod dispatcher;
mod telegram;

pub use dispatcher::{TypingIndicator, UpdateDispatcher, CHAT_BUSY_TEXT};
pub use telegram::{
    parse_command_text, parse_update, split_message, telegram_api_base, TelegramChannel,
    TelegramUpdate, MAX_MESSAGE_UTF16,
};

use crate::bot::{InboundMessage, OutboundResponse};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
    #[error("reading attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One delivered update: the router's view of it plus the transport's acknowledgement handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    pub message: InboundMessage,
    /// Set for button clicks; the click must be answered so the client stops its spinner.
    pub callback_query_id: Option<String>,
}

impl Incoming {
    pub fn new(message: InboundMessage) -> Self {
        Self {
            message,
            callback_query_id: None,
        }
    }

    pub fn is_callback(&self) -> bool {
        self.message.callback_data.is_some()
    }
}

/// Outbound side of a chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_response(&self, response: &OutboundResponse) -> Result<(), ChannelError>;

    async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError>;

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), ChannelError>;
}
