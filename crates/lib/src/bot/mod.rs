//! Trading bot core: allow-list gate, command router, trade confirmation dialogue, and the
//! callback tokens that carry that dialogue between its two steps.

mod auth;
mod callback;
mod error;
mod handlers;
mod message;
mod router;
mod trade;

pub use auth::AllowList;
pub use callback::{CallbackCodec, CallbackError, CallbackToken, Choice, MAX_CALLBACK_DATA_LEN, TRADE_ACTION};
pub use error::DispatchError;
pub use message::{Button, InboundMessage, OutboundResponse};
pub use router::{
    Command, Router, RouterBuilder, DISPATCH_FAILED_TEXT, EMPTY_TEXT_PROMPT, INVALID_BUTTON_TEXT,
    NOT_AUTHORIZED_TEXT, UNKNOWN_COMMAND_TEXT,
};
pub use trade::{PendingTrade, ResolvedTrade, TradeInputError};
