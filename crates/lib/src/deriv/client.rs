//! WebSocket session with the Deriv API. One connection, requests correlated by `req_id`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::wire;
use crate::config::DerivConfig;
use crate::market::{
    Balance, BrokerError, BrokerageClient, Direction, HistoricalDataPoint, HistoricalDataRequest,
    MarketDataProvider,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection and contract settings for [`DerivClient`].
#[derive(Debug, Clone)]
pub struct DerivSettings {
    pub endpoint: String,
    pub app_id: String,
    pub api_token: String,
    pub currency: String,
    pub duration_ticks: u32,
    pub symbols: Vec<String>,
}

impl DerivSettings {
    /// Settings from the `deriv` config section with already-resolved credentials.
    pub fn from_config(config: &DerivConfig, app_id: String, api_token: String) -> Self {
        Self {
            endpoint: config.endpoint.trim().to_string(),
            app_id,
            api_token,
            currency: config.currency.clone(),
            duration_ticks: config.contract_duration_ticks,
            symbols: config.symbols.clone(),
        }
    }

    fn url(&self) -> String {
        format!("{}?app_id={}&l=EN", self.endpoint, self.app_id)
    }
}

/// Deriv client. Requests share one socket and are sent one at a time.
pub struct DerivClient {
    settings: DerivSettings,
    socket: Mutex<Option<WsStream>>,
    next_req_id: AtomicU64,
    request_timeout: Duration,
}

impl DerivClient {
    pub fn new(settings: DerivSettings) -> Self {
        Self {
            settings,
            socket: Mutex::new(None),
            next_req_id: AtomicU64::new(1),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn is_connected(&self) -> bool {
        self.socket.lock().await.is_some()
    }

    /// Keep-alive; Deriv drops sockets that stay idle for two minutes.
    pub async fn ping(&self) -> Result<(), BrokerError> {
        self.request(wire::ping_request()).await.map(|_| ())
    }

    /// Send one request and wait for the response with the same `req_id`. Frames for other
    /// ids (e.g. answers to requests whose caller went away) are skipped.
    async fn request(&self, mut body: Value) -> Result<Value, BrokerError> {
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        body["req_id"] = Value::from(req_id);

        let mut guard = self.socket.lock().await;
        let ws = guard.as_mut().ok_or(BrokerError::NotConnected)?;

        let result = tokio::time::timeout(self.request_timeout, exchange(ws, req_id, &body)).await;
        match result {
            Ok(Ok(response)) => match wire::response_error(&response) {
                Some(err) => Err(err),
                None => Ok(response),
            },
            Ok(Err(e)) => {
                if matches!(e, BrokerError::Connection(_)) {
                    log::warn!("deriv: connection lost: {}", e);
                    *guard = None;
                }
                Err(e)
            }
            Err(_) => {
                // A late answer would be left on the socket; start over on a fresh one.
                log::warn!("deriv: request {} timed out, dropping connection", req_id);
                *guard = None;
                Err(BrokerError::Timeout)
            }
        }
    }
}

async fn exchange(ws: &mut WsStream, req_id: u64, body: &Value) -> Result<Value, BrokerError> {
    let msg_type = body
        .as_object()
        .and_then(|o| o.keys().next())
        .map(String::as_str)
        .unwrap_or("?");
    log::debug!("deriv: -> {} (req_id {})", msg_type, req_id);
    ws.send(Message::Text(body.to_string()))
        .await
        .map_err(|e| BrokerError::Connection(e.to_string()))?;

    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| BrokerError::Connection(e.to_string()))?;
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => {
                return Err(BrokerError::Connection("socket closed by server".into()))
            }
            _ => continue,
        };
        let response: Value = serde_json::from_str(&text)
            .map_err(|e| BrokerError::Protocol(format!("invalid json: {}", e)))?;
        if response.get("req_id").and_then(Value::as_u64) == Some(req_id) {
            return Ok(response);
        }
        log::debug!("deriv: skipping frame for another request");
    }
    Err(BrokerError::Connection("socket closed".into()))
}

#[async_trait]
impl MarketDataProvider for DerivClient {
    async fn get_price(&self, symbol: &str) -> Result<f64, BrokerError> {
        let response = self.request(wire::latest_price_request(symbol)).await?;
        wire::parse_latest_price(&response)
    }

    async fn get_historical_data(
        &self,
        req: &HistoricalDataRequest,
    ) -> Result<Vec<HistoricalDataPoint>, BrokerError> {
        let now = chrono::Utc::now().timestamp();
        let response = self.request(wire::history_request(req, now)).await?;
        wire::parse_history(&response, req.style)
    }
}

#[async_trait]
impl BrokerageClient for DerivClient {
    /// Open the socket and authorize it. Replaces an existing connection.
    async fn connect(&self) -> Result<(), BrokerError> {
        let url = self.settings.url();
        log::info!("deriv: connecting to {}", self.settings.endpoint);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        *self.socket.lock().await = Some(ws);

        match self
            .request(wire::authorize_request(&self.settings.api_token))
            .await
        {
            Ok(response) => {
                let login = response
                    .get("authorize")
                    .and_then(|a| a.get("loginid"))
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                log::info!("deriv: authorized as {}", login);
                Ok(())
            }
            Err(e) => {
                let _ = self.close().await;
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if let Some(mut ws) = self.socket.lock().await.take() {
            ws.close(None)
                .await
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
            log::info!("deriv: connection closed");
        }
        Ok(())
    }

    async fn get_balance(&self) -> Result<Balance, BrokerError> {
        let response = self.request(wire::balance_request()).await?;
        wire::parse_balance(&response)
    }

    async fn place_trade(
        &self,
        symbol: &str,
        amount: f64,
        direction: Direction,
    ) -> Result<(), BrokerError> {
        let proposal = self
            .request(wire::proposal_request(
                symbol,
                amount,
                direction,
                &self.settings.currency,
                self.settings.duration_ticks,
            ))
            .await?;
        let proposal_id = wire::parse_proposal_id(&proposal)?;
        let bought = self
            .request(wire::buy_request(&proposal_id, amount))
            .await?;
        let contract_id = wire::parse_contract_id(&bought)?;
        log::info!(
            "deriv: bought contract {} ({} {} {:.2})",
            contract_id,
            direction,
            symbol,
            amount
        );
        Ok(())
    }

    async fn get_position(&self) -> Result<String, BrokerError> {
        let response = self.request(wire::open_contract_request()).await?;
        Ok(wire::format_open_contract(&response))
    }

    async fn get_available_symbols(&self) -> Result<Vec<String>, BrokerError> {
        Ok(self.settings.symbols.clone())
    }
}
