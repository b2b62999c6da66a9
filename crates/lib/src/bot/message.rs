//! Inbound chat events and outbound replies exchanged between the transport and the router.

use std::path::PathBuf;

/// A chat event delivered by the transport: a command, free text, or a button click.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub chat_id: i64,
    pub message_id: i64,
    pub username: String,
    pub callback_data: Option<String>,
}

impl InboundMessage {
    /// A slash command (`/price R_50` ⇒ command `price`, args `["R_50"]`).
    pub fn command(
        chat_id: i64,
        message_id: i64,
        username: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            command: Some(command.into()),
            args,
            chat_id,
            message_id,
            username: username.into(),
            callback_data: None,
        }
    }

    /// Free-form text for the language backend.
    pub fn text(
        chat_id: i64,
        message_id: i64,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            command: None,
            args: vec![text.into()],
            chat_id,
            message_id,
            username: username.into(),
            callback_data: None,
        }
    }

    /// A button click carrying callback data.
    pub fn callback(
        chat_id: i64,
        message_id: i64,
        username: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            command: None,
            args: Vec::new(),
            chat_id,
            message_id,
            username: username.into(),
            callback_data: Some(data.into()),
        }
    }

    /// Arguments joined by single spaces.
    pub fn joined_text(&self) -> String {
        self.args.join(" ")
    }
}

/// An inline button: visible label plus the data echoed back on click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// The router's reply to exactly one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub text: String,
    pub chat_id: i64,
    pub reply_to_message_id: i64,
    /// Rows of buttons, rendered top to bottom.
    pub buttons: Vec<Vec<Button>>,
    pub image_path: Option<PathBuf>,
}

impl OutboundResponse {
    /// Plain text reply correlated with `msg`.
    pub fn reply(msg: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chat_id: msg.chat_id,
            reply_to_message_id: msg.message_id,
            buttons: Vec::new(),
            image_path: None,
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<Button>>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}
