//! Command router: authorize, classify, and dispatch one inbound message to one reply.
//!
//! Order of precedence: allow-list gate, then callback data (button clicks), then slash
//! commands, then free text for the language backend.

use crate::assistant::LanguageBackend;
use crate::bot::auth::AllowList;
use crate::bot::callback::CallbackCodec;
use crate::bot::error::DispatchError;
use crate::bot::message::{InboundMessage, OutboundResponse};
use crate::market::{BrokerageClient, MarketView};
use crate::tools::FunctionCatalog;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NOT_AUTHORIZED_TEXT: &str = "⚠️ You are not authorized to use this bot.";
pub const UNKNOWN_COMMAND_TEXT: &str = "❌ Unknown command. Type /help for available commands.";
pub const EMPTY_TEXT_PROMPT: &str = "❌ Please provide some text for me to process.";
pub const INVALID_BUTTON_TEXT: &str =
    "❌ This button is not valid. Start a new trade with /buy <symbol> <amount>.";
/// Sent by the transport when dispatch fails; the cause is only logged.
pub const DISPATCH_FAILED_TEXT: &str = "❌ Error executing command. Please try again later.";

/// Slash commands understood by the router, matched by exact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Symbols,
    Balance,
    Price,
    Buy,
    Position,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::Start,
        Command::Help,
        Command::Symbols,
        Command::Balance,
        Command::Price,
        Command::Buy,
        Command::Position,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Symbols => "symbols",
            Command::Balance => "balance",
            Command::Price => "price",
            Command::Buy => "buy",
            Command::Position => "position",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// The router. Immutable after [`RouterBuilder::build`]; share it behind an `Arc`.
pub struct Router {
    pub(super) broker: Arc<dyn BrokerageClient>,
    pub(super) language: Arc<dyn LanguageBackend>,
    pub(super) allow_list: AllowList,
    pub(super) symbols: Vec<String>,
    pub(super) codec: CallbackCodec,
    pub(super) catalog: FunctionCatalog,
}

pub struct RouterBuilder {
    broker: Arc<dyn BrokerageClient>,
    language: Arc<dyn LanguageBackend>,
    allow_list: AllowList,
    symbols: Vec<String>,
    codec: CallbackCodec,
    catalog: FunctionCatalog,
}

impl RouterBuilder {
    pub fn allowed_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allow_list = AllowList::new(users);
        self
    }

    pub fn symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    /// Sign callback tokens with `secret` (see [`CallbackCodec::signed`]).
    pub fn callback_secret(mut self, secret: Option<&str>) -> Self {
        self.codec = match secret {
            Some(s) => CallbackCodec::signed(s),
            None => CallbackCodec::unsigned(),
        };
        self
    }

    pub fn catalog(mut self, catalog: FunctionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn build(self) -> Router {
        if self.allow_list.is_empty() {
            log::warn!("router: allow-list is empty, every message will be rejected");
        }
        Router {
            broker: self.broker,
            language: self.language,
            allow_list: self.allow_list,
            symbols: self.symbols,
            codec: self.codec,
            catalog: self.catalog,
        }
    }
}

impl Router {
    pub fn builder(
        broker: Arc<dyn BrokerageClient>,
        language: Arc<dyn LanguageBackend>,
    ) -> RouterBuilder {
        RouterBuilder {
            broker,
            language,
            allow_list: AllowList::default(),
            symbols: Vec::new(),
            codec: CallbackCodec::unsigned(),
            catalog: FunctionCatalog::market_data(),
        }
    }

    /// Produce the reply for `msg`. Fails only on collaborator faults or when `cancel` fires;
    /// on cancellation pending collaborator calls are dropped and no reply is produced.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        msg: &InboundMessage,
    ) -> Result<OutboundResponse, DispatchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            res = self.route(msg) => res,
        }
    }

    async fn route(&self, msg: &InboundMessage) -> Result<OutboundResponse, DispatchError> {
        if !self.allow_list.is_allowed(&msg.username) {
            log::info!(
                "router: rejected message from unauthorized user {:?} in chat {}",
                msg.username,
                msg.chat_id
            );
            return Ok(OutboundResponse::reply(msg, NOT_AUTHORIZED_TEXT));
        }

        if let Some(data) = msg.callback_data.as_deref().filter(|d| !d.is_empty()) {
            return self.handle_callback(msg, data).await;
        }

        if let Some(name) = msg.command.as_deref().filter(|c| !c.is_empty()) {
            return match Command::from_name(name) {
                Some(command) => {
                    log::debug!("router: /{} from {}", name, msg.username);
                    self.run_command(command, msg).await
                }
                None => Ok(OutboundResponse::reply(msg, UNKNOWN_COMMAND_TEXT)),
            };
        }

        self.handle_free_text(msg).await
    }

    async fn run_command(
        &self,
        command: Command,
        msg: &InboundMessage,
    ) -> Result<OutboundResponse, DispatchError> {
        match command {
            Command::Start => Ok(self.handle_start(msg)),
            Command::Help => Ok(self.handle_help(msg)),
            Command::Symbols => Ok(self.handle_symbols(msg)),
            Command::Balance => self.handle_balance(msg).await,
            Command::Price => self.handle_price(msg).await,
            Command::Buy => self.handle_buy(msg),
            Command::Position => self.handle_position(msg).await,
        }
    }

    /// Button clicks. Only `trade` tokens resume a dialogue; anything else is a stale or
    /// forged button and gets a plain reply.
    async fn handle_callback(
        &self,
        msg: &InboundMessage,
        data: &str,
    ) -> Result<OutboundResponse, DispatchError> {
        match self.codec.decode(msg.chat_id, data) {
            Ok(token) if token.is_trade() && token.amount > 0.0 => {
                self.confirm_trade(msg, &token).await
            }
            Ok(token) if token.is_trade() => {
                log::info!("router: rejected trade callback with amount {}", token.amount);
                Ok(OutboundResponse::reply(msg, INVALID_BUTTON_TEXT))
            }
            Ok(token) => {
                log::debug!("router: ignoring callback with action {:?}", token.action);
                Ok(OutboundResponse::reply(msg, INVALID_BUTTON_TEXT))
            }
            Err(e) => {
                log::info!("router: rejected callback {:?}: {}", data, e);
                Ok(OutboundResponse::reply(msg, INVALID_BUTTON_TEXT))
            }
        }
    }

    async fn handle_free_text(&self, msg: &InboundMessage) -> Result<OutboundResponse, DispatchError> {
        let text = msg.joined_text();
        if text.trim().is_empty() {
            return Ok(OutboundResponse::reply(msg, EMPTY_TEXT_PROMPT));
        }
        let provider = MarketView(self.broker.as_ref());
        let answer = self
            .language
            .process_with_functions(&text, &provider, &self.catalog)
            .await?;
        Ok(OutboundResponse::reply(msg, answer))
    }
}
