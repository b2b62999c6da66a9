//! In-memory fakes for the router's collaborators and the chat transport.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use teletrader::assistant::LanguageBackend;
use teletrader::bot::OutboundResponse;
use teletrader::channels::{ChannelError, ChatTransport};
use teletrader::llm::LlmError;
use teletrader::market::{
    Balance, BrokerError, BrokerageClient, Direction, HistoricalDataPoint, HistoricalDataRequest,
    MarketDataProvider,
};
use teletrader::tools::FunctionCatalog;

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Balance,
    Price(String),
    History(String),
    PlaceTrade(String, f64, Direction),
    Position,
    Symbols,
}

/// Records every call. `price` is returned by get_price; `fail` makes every call fail;
/// `delay` is awaited before answering.
#[derive(Default)]
pub struct FakeBroker {
    pub calls: Mutex<Vec<BrokerCall>>,
    pub price: f64,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeBroker {
    pub fn with_price(price: f64) -> Self {
        Self {
            price,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            price: 1.0,
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: BrokerCall) -> Result<(), BrokerError> {
        self.calls.lock().unwrap().push(call);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(BrokerError::Api("market closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for FakeBroker {
    async fn get_price(&self, symbol: &str) -> Result<f64, BrokerError> {
        self.record(BrokerCall::Price(symbol.to_string())).await?;
        Ok(self.price)
    }

    async fn get_historical_data(
        &self,
        req: &HistoricalDataRequest,
    ) -> Result<Vec<HistoricalDataPoint>, BrokerError> {
        self.record(BrokerCall::History(req.symbol.clone())).await?;
        Ok(Vec::new())
    }
}

#[async_trait]
impl BrokerageClient for FakeBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn get_balance(&self) -> Result<Balance, BrokerError> {
        self.record(BrokerCall::Balance).await?;
        Ok(Balance {
            amount: 1000.0,
            currency: "USD".into(),
        })
    }

    async fn place_trade(
        &self,
        symbol: &str,
        amount: f64,
        direction: Direction,
    ) -> Result<(), BrokerError> {
        self.record(BrokerCall::PlaceTrade(symbol.to_string(), amount, direction))
            .await
    }

    async fn get_position(&self) -> Result<String, BrokerError> {
        self.record(BrokerCall::Position).await?;
        Ok("No open positions".into())
    }

    async fn get_available_symbols(&self) -> Result<Vec<String>, BrokerError> {
        self.record(BrokerCall::Symbols).await?;
        Ok(vec!["R_50".into()])
    }
}

/// Answers every prompt with a fixed reply and records the inputs. With `fail` set every
/// completion errors instead.
pub struct FakeLanguage {
    pub inputs: Mutex<Vec<String>>,
    pub reply: String,
    pub fail: bool,
}

impl FakeLanguage {
    pub fn replying(reply: &str) -> Self {
        Self {
            inputs: Mutex::new(Vec::new()),
            reply: reply.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::replying("")
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageBackend for FakeLanguage {
    async fn process_text(&self, input: &str) -> Result<String, LlmError> {
        self.inputs.lock().unwrap().push(input.to_string());
        if self.fail {
            return Err(LlmError::UnknownFunction("get_weather".into()));
        }
        Ok(self.reply.clone())
    }

    async fn process_with_functions(
        &self,
        input: &str,
        _provider: &dyn MarketDataProvider,
        catalog: &FunctionCatalog,
    ) -> Result<String, LlmError> {
        assert!(catalog.contains("get_price"));
        self.process_text(input).await
    }
}

/// Collects everything the dispatcher would send to Telegram.
#[derive(Default)]
pub struct RecordingTransport {
    pub responses: Mutex<Vec<OutboundResponse>>,
    pub typing: Mutex<Vec<i64>>,
    pub answered: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn texts(&self) -> Vec<String> {
        self.responses
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    /// Poll until `n` responses arrived or `timeout` elapsed.
    pub async fn wait_for_responses(&self, n: usize, timeout: Duration) -> Vec<OutboundResponse> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let got = self.responses.lock().unwrap().clone();
            if got.len() >= n || tokio::time::Instant::now() >= deadline {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_response(&self, response: &OutboundResponse) -> Result<(), ChannelError> {
        self.responses.lock().unwrap().push(response.clone());
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError> {
        self.typing.lock().unwrap().push(chat_id);
        Ok(())
    }

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), ChannelError> {
        self.answered
            .lock()
            .unwrap()
            .push(callback_query_id.to_string());
        Ok(())
    }
}
