//! Two-step trade confirmation: `/buy <symbol> <amount>` offers Up/Down buttons, and the
//! button click places the trade.
//!
//! No state is kept between the steps; the pending trade travels inside the button's
//! callback token, so a stale button stays valid indefinitely.

use crate::bot::callback::{CallbackToken, Choice};
use crate::market::Direction;

/// Why step one did not advance. Each maps to a fixed user-facing reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeInputError {
    MissingArguments,
    InvalidAmount,
}

/// `AwaitingDirection`: symbol and amount accepted, waiting for the button click.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTrade {
    pub symbol: String,
    pub amount: f64,
}

/// `Resolved`: a direction was chosen and the trade can be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrade {
    pub symbol: String,
    pub amount: f64,
    pub direction: Direction,
}

impl Choice {
    pub fn direction(&self) -> Direction {
        match self {
            Choice::Up => Direction::Call,
            Choice::Down => Direction::Put,
        }
    }
}

impl PendingTrade {
    /// Parse the positional `<symbol> <amount>` arguments. The symbol is opaque; the amount
    /// must be a finite positive number.
    pub fn parse(args: &[String]) -> Result<Self, TradeInputError> {
        let (Some(symbol), Some(amount)) = (args.first(), args.get(1)) else {
            return Err(TradeInputError::MissingArguments);
        };
        let amount: f64 = amount
            .trim()
            .parse()
            .map_err(|_| TradeInputError::InvalidAmount)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(TradeInputError::InvalidAmount);
        }
        Ok(Self {
            symbol: symbol.clone(),
            amount,
        })
    }

    /// Token carried by the button for `choice`.
    pub fn token(&self, choice: Choice) -> CallbackToken {
        CallbackToken::trade(self.symbol.clone(), self.amount, choice)
    }
}

impl ResolvedTrade {
    /// Resume the dialogue from a decoded trade token.
    pub fn from_token(token: &CallbackToken) -> Self {
        Self {
            symbol: token.symbol.clone(),
            amount: token.amount,
            direction: token.choice.direction(),
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self.direction {
            Direction::Call => "⬆️",
            Direction::Put => "⬇️",
        }
    }
}
