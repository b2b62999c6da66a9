//! Market data and brokerage capabilities consumed by the router and the tool bridge.
//!
//! The router only depends on these traits; the Deriv WebSocket adapter in [`crate::deriv`]
//! is the one production implementation.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Look-back window for historical data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interval {
    #[default]
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }

    /// Window length in seconds (a month is 30 days).
    pub fn lookback_secs(&self) -> i64 {
        match self {
            Interval::Hour => 3_600,
            Interval::Day => 86_400,
            Interval::Week => 604_800,
            Interval::Month => 2_592_000,
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            other => Err(format!("invalid interval: {}", other)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of historical data: raw ticks or OHLC candles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataStyle {
    Ticks,
    #[default]
    Candles,
}

impl DataStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataStyle::Ticks => "ticks",
            DataStyle::Candles => "candles",
        }
    }
}

impl FromStr for DataStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ticks" => Ok(DataStyle::Ticks),
            "candles" => Ok(DataStyle::Candles),
            other => Err(format!("invalid data style: {}", other)),
        }
    }
}

impl fmt::Display for DataStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalDataRequest {
    pub symbol: String,
    pub interval: Interval,
    pub style: DataStyle,
    /// Number of ticks or candles to return.
    pub count: u32,
}

/// One historical sample. `open`/`high`/`low`/`close` are only meaningful for candles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalDataPoint {
    pub timestamp: i64,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub amount: f64,
    pub currency: String,
}

/// Contract direction sent to the brokerage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("brokerage connection failed: {0}")]
    Connection(String),
    #[error("brokerage api error: {0}")]
    Api(String),
    #[error("unexpected brokerage response: {0}")]
    Protocol(String),
    #[error("not connected to brokerage")]
    NotConnected,
    #[error("brokerage request timed out")]
    Timeout,
}

/// Read-only market data; this is what the language backend's tools may touch.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<f64, BrokerError>;

    async fn get_historical_data(
        &self,
        req: &HistoricalDataRequest,
    ) -> Result<Vec<HistoricalDataPoint>, BrokerError>;
}

/// Full brokerage capability used by the command handlers.
#[async_trait]
pub trait BrokerageClient: MarketDataProvider {
    async fn connect(&self) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;

    async fn get_balance(&self) -> Result<Balance, BrokerError>;

    async fn place_trade(
        &self,
        symbol: &str,
        amount: f64,
        direction: Direction,
    ) -> Result<(), BrokerError>;

    /// Free-text summary of open positions.
    async fn get_position(&self) -> Result<String, BrokerError>;

    async fn get_available_symbols(&self) -> Result<Vec<String>, BrokerError>;
}

/// Exposes only the market-data half of a brokerage client.
pub struct MarketView<'a>(pub &'a dyn BrokerageClient);

#[async_trait]
impl MarketDataProvider for MarketView<'_> {
    async fn get_price(&self, symbol: &str) -> Result<f64, BrokerError> {
        self.0.get_price(symbol).await
    }

    async fn get_historical_data(
        &self,
        req: &HistoricalDataRequest,
    ) -> Result<Vec<HistoricalDataPoint>, BrokerError> {
        self.0.get_historical_data(req).await
    }
}
