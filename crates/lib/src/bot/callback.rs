//! Callback tokens carried by inline buttons.
//!
//! Wire format: `action:symbol:amount:direction`, ASCII, amount with exactly two decimals
//! (e.g. `trade:R_50:10.50:up`). The whole pending-trade state lives in the token, so nothing
//! is stored server-side. When a secret is configured a fifth field is appended: a truncated
//! HMAC-SHA256 over the chat id and the first four fields, which rejects forged tokens and
//! tokens replayed into another chat.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Action name of the trade-confirmation dialogue.
pub const TRADE_ACTION: &str = "trade";

/// Telegram rejects callback data longer than this.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Bytes of the MAC kept in the token (hex-encoded to twice as many chars).
const TAG_LEN: usize = 8;

/// Direction suffix chosen on the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Up,
    Down,
}

impl Choice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::Up => "up",
            Choice::Down => "down",
        }
    }
}

impl FromStr for Choice {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Choice::Up),
            "down" => Ok(Choice::Down),
            other => Err(CallbackError::Direction(other.to_string())),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackToken {
    pub action: String,
    pub symbol: String,
    pub amount: f64,
    pub choice: Choice,
}

impl CallbackToken {
    pub fn trade(symbol: impl Into<String>, amount: f64, choice: Choice) -> Self {
        Self {
            action: TRADE_ACTION.to_string(),
            symbol: symbol.into(),
            amount,
            choice,
        }
    }

    pub fn is_trade(&self) -> bool {
        self.action == TRADE_ACTION
    }

    /// The unsigned four-field form.
    fn payload(&self) -> String {
        format!(
            "{}:{}:{:.2}:{}",
            self.action, self.symbol, self.amount, self.choice
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("malformed callback data: {0}")]
    Malformed(String),
    #[error("invalid callback amount: {0}")]
    Amount(String),
    #[error("invalid callback direction: {0}")]
    Direction(String),
    #[error("callback signature missing or invalid")]
    Signature,
    #[error("callback field contains a reserved character: {0}")]
    ReservedChar(String),
    #[error("callback data exceeds {MAX_CALLBACK_DATA_LEN} bytes")]
    TooLong,
}

/// Encodes and decodes callback tokens, signing them when a secret is set.
#[derive(Clone, Default)]
pub struct CallbackCodec {
    key: Option<HmacSha256>,
}

impl fmt::Debug for CallbackCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCodec")
            .field("signed", &self.key.is_some())
            .finish()
    }
}

impl CallbackCodec {
    /// Unsigned tokens, matching the plain four-field format.
    pub fn unsigned() -> Self {
        Self { key: None }
    }

    /// Signed tokens. An empty secret falls back to unsigned.
    pub fn signed(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Self::unsigned();
        }
        Self {
            key: HmacSha256::new_from_slice(secret).ok(),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.key.is_some()
    }

    fn mac(key: &HmacSha256, chat_id: i64, payload: &str) -> HmacSha256 {
        let mut mac = key.clone();
        mac.update(chat_id.to_string().as_bytes());
        mac.update(b":");
        mac.update(payload.as_bytes());
        mac
    }

    /// Encode a token for a button shown in `chat_id`.
    pub fn encode(&self, chat_id: i64, token: &CallbackToken) -> Result<String, CallbackError> {
        for field in [&token.action, &token.symbol] {
            if field.is_empty() {
                return Err(CallbackError::Malformed("empty field".to_string()));
            }
            if field.contains(':') || !field.is_ascii() {
                return Err(CallbackError::ReservedChar(field.clone()));
            }
        }
        if !token.amount.is_finite() {
            return Err(CallbackError::Amount(token.amount.to_string()));
        }
        let payload = token.payload();
        let data = match &self.key {
            Some(key) => {
                let tag = Self::mac(key, chat_id, &payload).finalize().into_bytes();
                format!("{}:{}", payload, hex::encode(&tag[..TAG_LEN]))
            }
            None => payload,
        };
        if data.len() > MAX_CALLBACK_DATA_LEN {
            return Err(CallbackError::TooLong);
        }
        Ok(data)
    }

    /// Decode callback data received in `chat_id`.
    pub fn decode(&self, chat_id: i64, data: &str) -> Result<CallbackToken, CallbackError> {
        let parts: Vec<&str> = data.split(':').collect();
        let expected = if self.key.is_some() { 5 } else { 4 };
        if parts.len() != expected {
            if parts.len() == 4 && self.key.is_some() {
                return Err(CallbackError::Signature);
            }
            return Err(CallbackError::Malformed(data.to_string()));
        }
        if let Some(key) = &self.key {
            let payload = parts[..4].join(":");
            let tag = hex::decode(parts[4]).map_err(|_| CallbackError::Signature)?;
            if tag.len() != TAG_LEN {
                return Err(CallbackError::Signature);
            }
            Self::mac(key, chat_id, &payload)
                .verify_truncated_left(&tag)
                .map_err(|_| CallbackError::Signature)?;
        }
        let (action, symbol) = (parts[0], parts[1]);
        if action.is_empty() || symbol.is_empty() {
            return Err(CallbackError::Malformed(data.to_string()));
        }
        let amount: f64 = parts[2]
            .parse()
            .map_err(|_| CallbackError::Amount(parts[2].to_string()))?;
        if !amount.is_finite() {
            return Err(CallbackError::Amount(parts[2].to_string()));
        }
        let choice: Choice = parts[3].parse()?;
        Ok(CallbackToken {
            action: action.to_string(),
            symbol: symbol.to_string(),
            amount,
            choice,
        })
    }
}
