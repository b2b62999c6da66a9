//! Per-command handlers. Formatting-only commands never touch a collaborator; the others make
//! exactly one brokerage call and wrap any failure into a [`DispatchError`].

use crate::bot::callback::{CallbackError, CallbackToken, Choice};
use crate::bot::error::DispatchError;
use crate::bot::message::{Button, InboundMessage, OutboundResponse};
use crate::bot::router::Router;
use crate::bot::trade::{PendingTrade, ResolvedTrade, TradeInputError};

const START_TEXT: &str = "👋 Welcome to Deriv Trading Bot!

Use /help to see available commands.";

const HELP_TEXT: &str = "Available commands:

/symbols - List available trading symbols
/balance - Show account balance
/price <symbol> - Get current price for a symbol
/buy <symbol> <amount> - Start a trade, then choose Up or Down
/position - Show current positions

Any other message is answered by the trading assistant.";

const PRICE_USAGE_TEXT: &str = "❌ Please provide a symbol. Example: /price R_50";
const BUY_USAGE_TEXT: &str = "❌ Please provide symbol and amount. Example: /buy R_50 10.50";
const INVALID_AMOUNT_TEXT: &str = "❌ Invalid amount format. Please provide a number.";

impl Router {
    pub(super) fn handle_start(&self, msg: &InboundMessage) -> OutboundResponse {
        OutboundResponse::reply(msg, START_TEXT)
    }

    pub(super) fn handle_help(&self, msg: &InboundMessage) -> OutboundResponse {
        OutboundResponse::reply(msg, HELP_TEXT)
    }

    pub(super) fn handle_symbols(&self, msg: &InboundMessage) -> OutboundResponse {
        let text = format!("Available symbols:\n\n{}", self.symbols.join("\n"));
        OutboundResponse::reply(msg, text)
    }

    pub(super) async fn handle_balance(
        &self,
        msg: &InboundMessage,
    ) -> Result<OutboundResponse, DispatchError> {
        let balance = self
            .broker
            .get_balance()
            .await
            .map_err(DispatchError::brokerage("get balance"))?;
        Ok(OutboundResponse::reply(
            msg,
            format!("💰 Balance: {:.2} {}", balance.amount, balance.currency),
        ))
    }

    pub(super) async fn handle_price(
        &self,
        msg: &InboundMessage,
    ) -> Result<OutboundResponse, DispatchError> {
        let Some(symbol) = msg.args.first() else {
            return Ok(OutboundResponse::reply(msg, PRICE_USAGE_TEXT));
        };
        let price = self
            .broker
            .get_price(symbol)
            .await
            .map_err(DispatchError::brokerage("get price"))?;
        Ok(OutboundResponse::reply(
            msg,
            format!("💹 {} price: {:.2}", symbol, price),
        ))
    }

    pub(super) async fn handle_position(
        &self,
        msg: &InboundMessage,
    ) -> Result<OutboundResponse, DispatchError> {
        let position = self
            .broker
            .get_position()
            .await
            .map_err(DispatchError::brokerage("get position"))?;
        Ok(OutboundResponse::reply(
            msg,
            format!("📊 Current positions:\n\n{}", position),
        ))
    }

    /// Trade step one: validate `<symbol> <amount>` and offer the direction buttons.
    /// No brokerage call happens here.
    pub(super) fn handle_buy(&self, msg: &InboundMessage) -> Result<OutboundResponse, DispatchError> {
        let pending = match PendingTrade::parse(&msg.args) {
            Ok(p) => p,
            Err(TradeInputError::MissingArguments) => {
                return Ok(OutboundResponse::reply(msg, BUY_USAGE_TEXT));
            }
            Err(TradeInputError::InvalidAmount) => {
                return Ok(OutboundResponse::reply(msg, INVALID_AMOUNT_TEXT));
            }
        };

        let encode = |choice: Choice| self.codec.encode(msg.chat_id, &pending.token(choice));
        let buttons = match (encode(Choice::Up), encode(Choice::Down)) {
            (Ok(up), Ok(down)) => vec![vec![Button::new("Up", up), Button::new("Down", down)]],
            (Err(e), _) | (_, Err(e)) => {
                log::info!("router: cannot encode trade buttons for {:?}: {}", pending.symbol, e);
                let text = match e {
                    CallbackError::TooLong => "❌ Symbol is too long.",
                    _ => "❌ Invalid symbol.",
                };
                return Ok(OutboundResponse::reply(msg, text));
            }
        };

        let text = format!(
            "Choose direction for {} ${:.2}:",
            pending.symbol, pending.amount
        );
        Ok(OutboundResponse::reply(msg, text).with_buttons(buttons))
    }

    /// Trade step two: place the trade described by a decoded button token. Brokerage
    /// failures propagate; they are not retried.
    pub(super) async fn confirm_trade(
        &self,
        msg: &InboundMessage,
        token: &CallbackToken,
    ) -> Result<OutboundResponse, DispatchError> {
        if !token.is_trade() {
            return Err(DispatchError::UnexpectedCallback(token.action.clone()));
        }
        let trade = ResolvedTrade::from_token(token);
        log::info!(
            "router: placing {} trade on {} for {:.2} (user {})",
            trade.direction,
            trade.symbol,
            trade.amount,
            msg.username
        );
        self.broker
            .place_trade(&trade.symbol, trade.amount, trade.direction)
            .await
            .map_err(DispatchError::brokerage("place trade"))?;
        Ok(OutboundResponse::reply(
            msg,
            format!(
                "✅ {} Trade placed for {}: ${:.2} ({})",
                trade.arrow(),
                trade.symbol,
                trade.amount,
                trade.direction
            ),
        ))
    }
}
