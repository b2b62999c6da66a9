//! Telegram channel: long-poll getUpdates, webhook registration, and replies via the Bot API.

use crate::bot::{Button, InboundMessage, OutboundResponse};
use crate::channels::dispatcher::UpdateDispatcher;
use crate::channels::{ChannelError, ChatTransport, Incoming};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const CAPTION_MAX_UTF16: usize = 1024;
/// Telegram rejects longer message texts (counted in UTF-16 code units).
pub const MAX_MESSAGE_UTF16: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Value,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// `/cmd@botname a b` => (`cmd`, [`a`, `b`]). None when `text` is not a command.
pub fn parse_command_text(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split_once('@').map_or(head, |(name, _)| name);
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), parts.map(str::to_string).collect()))
}

/// Map a Telegram update to what the router consumes. Updates without text or callback data
/// (stickers, joins, edits) yield None.
pub fn parse_update(update: &TelegramUpdate) -> Option<Incoming> {
    if let Some(query) = &update.callback_query {
        let data = query.data.as_deref()?;
        let origin = query.message.as_ref()?;
        let username = query.from.username.clone().unwrap_or_default();
        return Some(Incoming {
            message: InboundMessage::callback(origin.chat.id, origin.message_id, username, data),
            callback_query_id: Some(query.id.clone()),
        });
    }

    let msg = update.message.as_ref()?;
    let text = msg.text.as_deref()?;
    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_default();
    let message = match parse_command_text(text) {
        Some((name, args)) => {
            InboundMessage::command(msg.chat.id, msg.message_id, username, name, args)
        }
        None => InboundMessage::text(msg.chat.id, msg.message_id, username, text),
    };
    Some(Incoming::new(message))
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Split `text` into chunks Telegram accepts, preferring line breaks as cut points.
pub fn split_message(text: &str, max_utf16: usize) -> Vec<String> {
    if utf16_len(text) <= max_utf16 {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = utf16_len(line);
        if current_len + line_len > max_utf16 && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= max_utf16 {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        for c in line.chars() {
            if current_len + c.len_utf16() > max_utf16 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += c.len_utf16();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn inline_keyboard(buttons: &[Vec<Button>]) -> Value {
    let rows: Vec<Vec<Value>> = buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.callback_data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Telegram Bot API client.
pub struct TelegramChannel {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn read_result(method: &str, res: reqwest::Response) -> Result<Value, ChannelError> {
        let status = res.status();
        let body = res.text().await?;
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(r) if r.ok && status.is_success() => Ok(r.result),
            Some(r) => Err(ChannelError::Api(format!(
                "{} failed: {} {}",
                method,
                status,
                r.description.unwrap_or_default()
            ))),
            None => Err(ChannelError::Api(format!("{} failed: {} {}", method, status, body))),
        }
    }

    async fn post_json(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let res = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        Self::read_result(method, res).await
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let mut body = json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(off) = offset {
            body["offset"] = json!(off);
        }
        let result = self.post_json("getUpdates", &body).await?;
        let updates: Vec<TelegramUpdate> = serde_json::from_value(result)
            .map_err(|e| ChannelError::Api(format!("getUpdates returned bad payload: {}", e)))?;
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChannelError> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(s) = secret {
            body["secret_token"] = Value::String(s.to_string());
        }
        self.post_json("setWebhook", &body).await.map(|_| ())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.post_json("deleteWebhook", &json!({})).await.map(|_| ())
    }

    /// sendMessage; `buttons` become an inline keyboard.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
        buttons: &[Vec<Button>],
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(id) = reply_to {
            body["reply_to_message_id"] = json!(id);
            body["allow_sending_without_reply"] = json!(true);
        }
        if !buttons.is_empty() {
            body["reply_markup"] = inline_keyboard(buttons);
        }
        self.post_json("sendMessage", &body).await.map(|_| ())
    }

    /// sendPhoto as multipart upload of a local file.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        path: &std::path::Path,
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<(), ChannelError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ChannelError::Attachment {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        if let Some(c) = caption {
            form = form.text("caption", c.to_string());
        }
        if let Some(id) = reply_to {
            form = form.text("reply_to_message_id", id.to_string());
        }
        let res = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        Self::read_result("sendPhoto", res).await.map(|_| ())
    }

    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), ChannelError> {
        self.post_json(
            "sendChatAction",
            &json!({ "chat_id": chat_id, "action": action }),
        )
        .await
        .map(|_| ())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), ChannelError> {
        self.post_json(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_query_id }),
        )
        .await
        .map(|_| ())
    }

    /// Long-poll until `cancel` fires, handing every update to `dispatcher`.
    pub async fn run_polling(&self, dispatcher: &UpdateDispatcher, cancel: CancellationToken) {
        log::info!("telegram: starting getUpdates long-poll loop");
        let mut offset: Option<i64> = None;
        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.get_updates(offset) => r,
            };
            match polled {
                Ok((updates, next)) => {
                    if next.is_some() {
                        offset = next;
                    }
                    for u in &updates {
                        match parse_update(u) {
                            Some(incoming) => dispatcher.submit(incoming).await,
                            None => log::debug!("telegram: ignoring update {}", u.update_id),
                        }
                    }
                }
                Err(e) => {
                    log::warn!("telegram getUpdates error: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                    }
                }
            }
        }
        log::info!("telegram: getUpdates loop stopped");
    }
}

#[async_trait]
impl ChatTransport for TelegramChannel {
    /// Long texts are split; buttons go on the last chunk. With an image, the text becomes the
    /// caption when it fits.
    async fn send_response(&self, response: &OutboundResponse) -> Result<(), ChannelError> {
        let reply_to = Some(response.reply_to_message_id).filter(|id| *id > 0);
        let mut text = response.text.as_str();

        if let Some(path) = &response.image_path {
            let fits = utf16_len(text) <= CAPTION_MAX_UTF16 && response.buttons.is_empty();
            let caption = (fits && !text.is_empty()).then_some(text);
            self.send_photo(response.chat_id, path, caption, reply_to)
                .await?;
            if fits {
                return Ok(());
            }
        }
        if text.trim().is_empty() {
            text = "…";
        }

        let chunks = split_message(text, MAX_MESSAGE_UTF16);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let buttons: &[Vec<Button>] = if i == last { &response.buttons } else { &[] };
            let reply = if i == 0 { reply_to } else { None };
            self.send_message(response.chat_id, chunk, reply, buttons)
                .await?;
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError> {
        self.send_chat_action(chat_id, "typing").await
    }

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), ChannelError> {
        self.answer_callback_query(callback_query_id).await
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(raw: &str) -> TelegramUpdate {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn command_with_bot_suffix() {
        assert_eq!(
            parse_command_text("/price@deriv_bot R_50"),
            Some(("price".to_string(), vec!["R_50".to_string()]))
        );
        assert_eq!(
            parse_command_text("/buy   R_50  10.5 "),
            Some(("buy".to_string(), vec!["R_50".to_string(), "10.5".to_string()]))
        );
        assert_eq!(parse_command_text("hello /there"), None);
        assert_eq!(parse_command_text("/"), None);
    }

    #[test]
    fn text_message_becomes_free_text() {
        let u = update(
            r#"{"update_id":1,"message":{"message_id":7,"chat":{"id":42},
            "from":{"id":5,"username":"Alice"},"text":"how is R_50 doing?"}}"#,
        );
        let incoming = parse_update(&u).unwrap();
        assert_eq!(
            incoming.message,
            InboundMessage::text(42, 7, "Alice", "how is R_50 doing?")
        );
        assert!(incoming.callback_query_id.is_none());
    }

    #[test]
    fn callback_query_uses_origin_message() {
        let u = update(
            r#"{"update_id":2,"callback_query":{"id":"cb1","from":{"id":5,"username":"alice"},
            "message":{"message_id":9,"chat":{"id":42}},"data":"trade:R_50:10.50:up"}}"#,
        );
        let incoming = parse_update(&u).unwrap();
        assert!(incoming.is_callback());
        assert_eq!(incoming.message.chat_id, 42);
        assert_eq!(incoming.message.message_id, 9);
        assert_eq!(incoming.callback_query_id.as_deref(), Some("cb1"));
    }

    #[test]
    fn updates_without_text_are_ignored() {
        let u = update(r#"{"update_id":3,"message":{"message_id":1,"chat":{"id":1}}}"#);
        assert!(parse_update(&u).is_none());
        assert!(parse_update(&update(r#"{"update_id":4}"#)).is_none());
    }

    #[test]
    fn long_text_is_split_on_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        assert_eq!(split_message(text, 10), vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(split_message("short", 10), vec!["short"]);
        assert_eq!(split_message("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn keyboard_rows_are_preserved() {
        let kb = inline_keyboard(&[vec![Button::new("Up", "u"), Button::new("Down", "d")]]);
        assert_eq!(kb["inline_keyboard"][0][1]["text"], "Down");
        assert_eq!(kb["inline_keyboard"][0][0]["callback_data"], "u");
    }
}
