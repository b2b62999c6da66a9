//! `get_price` and `get_historical_data`: catalog entries plus execution.

use std::fmt::Write as _;

use serde_json::{json, Map, Value};

use crate::llm::{LlmError, ToolCallFunction, ToolDefinition, ToolFunctionDefinition};
use crate::market::{DataStyle, HistoricalDataRequest, Interval, MarketDataProvider};

pub const GET_PRICE: &str = "get_price";
pub const GET_HISTORICAL_DATA: &str = "get_historical_data";
pub const DEFAULT_HISTORY_COUNT: u32 = 10;
pub const MAX_HISTORY_COUNT: u32 = 1000;

/// Ordered tool descriptors advertised to the language backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCatalog {
    definitions: Vec<ToolDefinition>,
}

impl FunctionCatalog {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        Self { definitions }
    }

    /// The two market-data functions, in registration order.
    pub fn market_data() -> Self {
        Self::new(vec![
            function(
                GET_PRICE,
                "Get the current price for a trading symbol",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {
                            "type": "string",
                            "description": "Trading symbol, e.g. R_50"
                        }
                    },
                    "required": ["symbol"]
                }),
            ),
            function(
                GET_HISTORICAL_DATA,
                "Get historical market data for a trading symbol as ticks or OHLC candles",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {
                            "type": "string",
                            "description": "Trading symbol, e.g. R_50"
                        },
                        "interval": {
                            "type": "string",
                            "enum": ["hour", "day", "week", "month"],
                            "description": "Look-back window"
                        },
                        "style": {
                            "type": "string",
                            "enum": ["ticks", "candles"],
                            "description": "Raw ticks or OHLC candles"
                        },
                        "count": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_HISTORY_COUNT,
                            "description": "Number of data points"
                        }
                    },
                    "required": ["symbol"]
                }),
            ),
        ])
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.function.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for FunctionCatalog {
    fn default() -> Self {
        Self::market_data()
    }
}

fn function(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        typ: "function".to_string(),
        function: ToolFunctionDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters,
        },
    }
}

/// Run one function call and format its result as text for the model.
pub async fn execute_market_function(
    provider: &dyn MarketDataProvider,
    call: &ToolCallFunction,
) -> Result<String, LlmError> {
    let args = arguments_object(call)?;
    match call.name.as_str() {
        GET_PRICE => {
            let symbol = required_symbol(&call.name, &args)?;
            let price = provider
                .get_price(&symbol)
                .await
                .map_err(|source| LlmError::Tool {
                    name: call.name.clone(),
                    source,
                })?;
            Ok(format!("Current price for {}: {:.2}", symbol, price))
        }
        GET_HISTORICAL_DATA => {
            let req = history_request(&call.name, &args)?;
            let points = provider
                .get_historical_data(&req)
                .await
                .map_err(|source| LlmError::Tool {
                    name: call.name.clone(),
                    source,
                })?;
            let mut out = format!(
                "Historical data for {} ({}, {}):\n",
                req.symbol, req.interval, req.style
            );
            for p in &points {
                let _ = match req.style {
                    DataStyle::Candles => writeln!(
                        out,
                        "Time: {}, Open: {:.2}, High: {:.2}, Low: {:.2}, Close: {:.2}",
                        p.timestamp, p.open, p.high, p.low, p.close
                    ),
                    DataStyle::Ticks => {
                        writeln!(out, "Time: {}, Price: {:.2}", p.timestamp, p.price)
                    }
                };
            }
            Ok(out)
        }
        other => Err(LlmError::UnknownFunction(other.to_string())),
    }
}

/// Models send arguments either as a JSON object or as a JSON-encoded string.
fn arguments_object(call: &ToolCallFunction) -> Result<Map<String, Value>, LlmError> {
    let invalid = |reason: String| LlmError::InvalidArguments {
        name: call.name.clone(),
        reason,
    };
    match &call.arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(invalid("arguments must be an object".to_string())),
            Err(e) => Err(invalid(e.to_string())),
        },
        _ => Err(invalid("arguments must be an object".to_string())),
    }
}

fn required_symbol(name: &str, args: &Map<String, Value>) -> Result<String, LlmError> {
    args.get("symbol")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LlmError::InvalidArguments {
            name: name.to_string(),
            reason: "symbol is required".to_string(),
        })
}

/// Missing or unusable optional arguments fall back to hour / candles / 10.
fn history_request(
    name: &str,
    args: &Map<String, Value>,
) -> Result<HistoricalDataRequest, LlmError> {
    let symbol = required_symbol(name, args)?;
    let interval = args
        .get("interval")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Interval>().ok())
        .unwrap_or_default();
    let style = args
        .get("style")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DataStyle>().ok())
        .unwrap_or_default();
    let count = args
        .get("count")
        .and_then(|v| v.as_f64().or_else(|| v.as_str()?.trim().parse().ok()))
        .filter(|c| c.is_finite() && *c >= 1.0)
        .map(|c| c.min(MAX_HISTORY_COUNT as f64) as u32)
        .unwrap_or(DEFAULT_HISTORY_COUNT);
    Ok(HistoricalDataRequest {
        symbol,
        interval,
        style,
        count,
    })
}
