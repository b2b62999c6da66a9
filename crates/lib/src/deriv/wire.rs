//! Request builders and response parsers for the Deriv API. Pure functions over JSON.

use serde_json::{json, Value};

use crate::market::{
    Balance, BrokerError, DataStyle, Direction, HistoricalDataPoint, HistoricalDataRequest,
};

/// Candle width for history requests, in seconds.
pub(crate) const CANDLE_GRANULARITY_SECS: u32 = 60;

pub(crate) const NO_OPEN_POSITIONS: &str = "No open positions";

/// `error` object of a response, if any.
pub(crate) fn response_error(v: &Value) -> Option<BrokerError> {
    let err = v.get("error")?;
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Some(match err.get("code").and_then(Value::as_str) {
        Some(code) => BrokerError::Api(format!("{}: {}", code, message)),
        None => BrokerError::Api(message.to_string()),
    })
}

/// Numbers arrive as JSON numbers or numeric strings depending on the call.
fn number(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str()?.trim().parse().ok())
}

fn field<'a>(v: &'a Value, section: &str) -> Result<&'a Value, BrokerError> {
    v.get(section)
        .filter(|s| !s.is_null())
        .ok_or_else(|| BrokerError::Protocol(format!("missing {:?} in response", section)))
}

pub(crate) fn authorize_request(token: &str) -> Value {
    json!({ "authorize": token })
}

pub(crate) fn balance_request() -> Value {
    json!({ "balance": 1 })
}

pub(crate) fn parse_balance(v: &Value) -> Result<Balance, BrokerError> {
    let b = field(v, "balance")?;
    let amount = b
        .get("balance")
        .and_then(number)
        .ok_or_else(|| BrokerError::Protocol("balance amount missing".into()))?;
    let currency = b
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Balance { amount, currency })
}

/// Latest quote: one tick of history ending now.
pub(crate) fn latest_price_request(symbol: &str) -> Value {
    json!({
        "ticks_history": symbol,
        "end": "latest",
        "count": 1,
        "style": "ticks",
    })
}

pub(crate) fn parse_latest_price(v: &Value) -> Result<f64, BrokerError> {
    field(v, "history")?
        .get("prices")
        .and_then(Value::as_array)
        .and_then(|p| p.last())
        .and_then(number)
        .ok_or_else(|| BrokerError::Protocol("no quote available".into()))
}

/// History window ends now and starts `interval` earlier.
pub(crate) fn history_request(req: &HistoricalDataRequest, now_epoch: i64) -> Value {
    let mut body = json!({
        "ticks_history": req.symbol,
        "end": "latest",
        "start": now_epoch - req.interval.lookback_secs(),
        "style": req.style.as_str(),
        "count": req.count,
    });
    if req.style == DataStyle::Candles {
        body["granularity"] = json!(CANDLE_GRANULARITY_SECS);
    }
    body
}

pub(crate) fn parse_history(
    v: &Value,
    style: DataStyle,
) -> Result<Vec<HistoricalDataPoint>, BrokerError> {
    match style {
        DataStyle::Ticks => {
            let history = field(v, "history")?;
            let empty = Vec::new();
            let prices = history
                .get("prices")
                .and_then(Value::as_array)
                .unwrap_or(&empty);
            let times = history
                .get("times")
                .and_then(Value::as_array)
                .unwrap_or(&empty);
            Ok(times
                .iter()
                .zip(prices)
                .filter_map(|(t, p)| {
                    Some(HistoricalDataPoint {
                        timestamp: number(t)? as i64,
                        price: number(p)?,
                        ..Default::default()
                    })
                })
                .collect())
        }
        DataStyle::Candles => {
            let candles = field(v, "candles")?
                .as_array()
                .ok_or_else(|| BrokerError::Protocol("candles is not a list".into()))?;
            Ok(candles
                .iter()
                .filter_map(|c| {
                    let close = c.get("close").and_then(number)?;
                    let get = |k: &str| c.get(k).and_then(number).unwrap_or_default();
                    Some(HistoricalDataPoint {
                        timestamp: c.get("epoch").and_then(number)? as i64,
                        price: close,
                        open: get("open"),
                        high: get("high"),
                        low: get("low"),
                        close,
                    })
                })
                .collect())
        }
    }
}

/// Stake-basis price proposal for a tick-duration rise/fall contract.
pub(crate) fn proposal_request(
    symbol: &str,
    amount: f64,
    direction: Direction,
    currency: &str,
    duration_ticks: u32,
) -> Value {
    json!({
        "proposal": 1,
        "amount": amount,
        "basis": "stake",
        "contract_type": direction.as_str(),
        "currency": currency,
        "duration": duration_ticks,
        "duration_unit": "t",
        "symbol": symbol,
    })
}

pub(crate) fn parse_proposal_id(v: &Value) -> Result<String, BrokerError> {
    field(v, "proposal")?
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrokerError::Protocol("proposal id missing".into()))
}

/// Buy at most at the stake.
pub(crate) fn buy_request(proposal_id: &str, max_price: f64) -> Value {
    json!({ "buy": proposal_id, "price": max_price })
}

pub(crate) fn parse_contract_id(v: &Value) -> Result<i64, BrokerError> {
    field(v, "buy")?
        .get("contract_id")
        .and_then(number)
        .map(|id| id as i64)
        .ok_or_else(|| BrokerError::Protocol("contract id missing".into()))
}

pub(crate) fn open_contract_request() -> Value {
    json!({ "proposal_open_contract": 1 })
}

/// Summary of the open contract, or [`NO_OPEN_POSITIONS`].
pub(crate) fn format_open_contract(v: &Value) -> String {
    let Some(c) = v
        .get("proposal_open_contract")
        .filter(|c| c.as_object().is_some_and(|o| !o.is_empty()))
    else {
        return NO_OPEN_POSITIONS.to_string();
    };
    let num = |k: &str| c.get(k).and_then(number).unwrap_or_default();
    let contract_id = c
        .get("contract_id")
        .and_then(number)
        .map(|id| (id as i64).to_string())
        .unwrap_or_else(|| "?".to_string());
    let contract_type = c
        .get("contract_type")
        .and_then(Value::as_str)
        .unwrap_or("?");
    format!(
        "Contract ID: {}\nType: {}\nEntry Spot: {:.2}\nCurrent Spot: {:.2}\nProfit: {:.2}",
        contract_id,
        contract_type,
        num("entry_spot"),
        num("current_spot"),
        num("profit")
    )
}

pub(crate) fn ping_request() -> Value {
    json!({ "ping": 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Interval;

    #[test]
    fn api_errors_carry_code_and_message() {
        let v = json!({"error": {"code": "InvalidToken", "message": "The token is invalid."}});
        let err = response_error(&v).unwrap();
        assert_eq!(
            err.to_string(),
            "brokerage api error: InvalidToken: The token is invalid."
        );
        assert!(response_error(&json!({"balance": {}})).is_none());
    }

    #[test]
    fn balance_accepts_string_amounts() {
        let v = json!({"balance": {"balance": "10042.5", "currency": "USD"}});
        let b = parse_balance(&v).unwrap();
        assert_eq!(b.amount, 10042.5);
        assert_eq!(b.currency, "USD");
    }

    #[test]
    fn candle_history_request_has_granularity() {
        let req = HistoricalDataRequest {
            symbol: "R_50".into(),
            interval: Interval::Day,
            style: DataStyle::Candles,
            count: 10,
        };
        let body = history_request(&req, 100_000);
        assert_eq!(body["start"], 100_000 - 86_400);
        assert_eq!(body["style"], "candles");
        assert_eq!(body["granularity"], 60);

        let ticks = HistoricalDataRequest {
            style: DataStyle::Ticks,
            ..req
        };
        assert!(history_request(&ticks, 100_000).get("granularity").is_none());
    }

    #[test]
    fn parses_ticks_and_candles() {
        let ticks = json!({"history": {"prices": [1.5, 1.6], "times": [10, 11]}});
        let points = parse_history(&ticks, DataStyle::Ticks).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].timestamp, 11);
        assert_eq!(points[1].price, 1.6);

        let candles = json!({"candles": [
            {"epoch": 60, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5},
            {"epoch": 120, "open": 1.5}
        ]});
        let points = parse_history(&candles, DataStyle::Candles).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].close, 1.5);
        assert_eq!(points[0].price, 1.5);
        assert_eq!(points[0].high, 2.0);
    }

    #[test]
    fn latest_price_is_last_tick() {
        let v = json!({"history": {"prices": [1.0, 2.25], "times": [1, 2]}});
        assert_eq!(parse_latest_price(&v).unwrap(), 2.25);
        assert!(parse_latest_price(&json!({"history": {"prices": []}})).is_err());
    }

    #[test]
    fn proposal_uses_stake_and_tick_duration() {
        let body = proposal_request("R_50", 10.5, Direction::Put, "USD", 5);
        assert_eq!(body["contract_type"], "PUT");
        assert_eq!(body["basis"], "stake");
        assert_eq!(body["duration_unit"], "t");
        assert_eq!(body["amount"], 10.5);
        let id = parse_proposal_id(&json!({"proposal": {"id": "abc-1", "ask_price": 10.5}})).unwrap();
        assert_eq!(buy_request(&id, 10.5), json!({"buy": "abc-1", "price": 10.5}));
    }

    #[test]
    fn open_contract_formatting() {
        assert_eq!(
            format_open_contract(&json!({"proposal_open_contract": {}})),
            NO_OPEN_POSITIONS
        );
        let v = json!({"proposal_open_contract": {
            "contract_id": 123456, "contract_type": "CALL",
            "entry_spot": "101.234", "current_spot": 102.5, "profit": -0.4
        }});
        assert_eq!(
            format_open_contract(&v),
            "Contract ID: 123456\nType: CALL\nEntry Spot: 101.23\nCurrent Spot: 102.50\nProfit: -0.40"
        );
    }
}
