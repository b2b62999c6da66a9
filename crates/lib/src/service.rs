//! Bot runtime: wire config, brokerage, language backend, router and Telegram together, run
//! until SIGINT/SIGTERM, then shut down in order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::assistant::{Assistant, LanguageBackend, DEFAULT_MODEL};
use crate::bot::Router;
use crate::channels::{TelegramChannel, UpdateDispatcher};
use crate::config::{self, Config, LlmBackendKind};
use crate::deriv::{DerivClient, DerivSettings};
use crate::gateway::{self, GatewayState};
use crate::llm::{LmStudioClient, OllamaClient};
use crate::market::BrokerageClient;

const DEFAULT_LMSTUDIO_MODEL: &str = "gpt-oss-20b";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Model id from config, or the backend's fallback when unset.
fn resolve_model(config_model: Option<&str>, backend: LlmBackendKind) -> String {
    let name = config_model
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match (name, backend) {
        (Some(name), _) => name,
        (None, LlmBackendKind::Ollama) => DEFAULT_MODEL.to_string(),
        (None, LlmBackendKind::LmStudio) => DEFAULT_LMSTUDIO_MODEL.to_string(),
    }
}

async fn build_language_backend(config: &Config) -> Arc<dyn LanguageBackend> {
    let model = resolve_model(config.llm.model.as_deref(), config.llm.backend);
    let base_url = config.llm.base_url.clone();
    match config.llm.backend {
        LlmBackendKind::Ollama => {
            let client = OllamaClient::new(base_url);
            match client.list_models().await {
                Ok(models) if !models.iter().any(|m| m.name == model) => log::warn!(
                    "ollama: model {} not found among {} installed models",
                    model,
                    models.len()
                ),
                Ok(_) => {}
                Err(e) => log::warn!("ollama not reachable at startup: {}", e),
            }
            log::info!("llm: using ollama model {}", model);
            Arc::new(Assistant::new(client, model))
        }
        LlmBackendKind::LmStudio => {
            let client = LmStudioClient::new(base_url);
            match client.list_models().await {
                Ok(models) if !models.iter().any(|m| m.name == model) => log::warn!(
                    "lm studio: model {} not loaded ({} available)",
                    model,
                    models.len()
                ),
                Ok(_) => {}
                Err(e) => log::warn!("lm studio not reachable at startup: {}", e),
            }
            log::info!("llm: using lm studio model {}", model);
            Arc::new(Assistant::new(client, model))
        }
    }
}

/// Ping the brokerage so the socket stays open; reconnect when a ping fails.
async fn keep_alive(client: Arc<DerivClient>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {}
        }
        if let Err(e) = client.ping().await {
            log::warn!("deriv: keep-alive failed: {}; reconnecting", e);
            let reconnect = tokio::select! {
                _ = cancel.cancelled() => break,
                r = client.connect() => r,
            };
            if let Err(e) = reconnect {
                log::warn!("deriv: reconnect failed: {}", e);
            }
        }
    }
}

/// Completes on Ctrl+C or SIGTERM. If a handler cannot be installed that source never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Run the bot until a shutdown signal arrives.
pub async fn run_bot(config: Config) -> Result<()> {
    let settings = config::validate(&config)?;

    let deriv = Arc::new(DerivClient::new(DerivSettings::from_config(
        &config.deriv,
        settings.deriv_app_id.clone(),
        settings.deriv_api_token.clone(),
    )));
    deriv.connect().await.context("connecting to Deriv")?;
    let symbols = match deriv.get_available_symbols().await {
        Ok(symbols) => symbols,
        Err(e) => {
            log::warn!("deriv: could not list symbols, using configured list: {}", e);
            config.deriv.symbols.clone()
        }
    };

    let language = build_language_backend(&config).await;
    let router = Arc::new(
        Router::builder(deriv.clone(), language)
            .allowed_users(&config.telegram.allowed_usernames)
            .symbols(symbols)
            .callback_secret(settings.callback_secret.as_deref())
            .build(),
    );

    let cancel = CancellationToken::new();
    let telegram = Arc::new(TelegramChannel::new(settings.bot_token.clone()));
    let dispatcher = Arc::new(UpdateDispatcher::new(
        router,
        telegram.clone(),
        cancel.clone(),
        Duration::from_secs(config.telegram.typing_interval_secs),
    ));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            log::info!("shutdown signal received, stopping");
            cancel.cancel();
        });
    }
    let keepalive = tokio::spawn(keep_alive(deriv.clone(), cancel.clone()));

    let webhook_url = config
        .telegram
        .webhook_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let served = match webhook_url {
        Some(url) => {
            let secret = config
                .telegram
                .webhook_secret
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            match telegram.set_webhook(url, secret.as_deref()).await {
                Ok(()) => {
                    log::info!("telegram: webhook mode at {}", url);
                    let state = GatewayState {
                        port: config.gateway.port,
                        webhook_secret: secret,
                        dispatcher: dispatcher.clone(),
                    };
                    let served =
                        gateway::serve(&config.gateway.bind, state, cancel.clone()).await;
                    if let Err(e) = telegram.delete_webhook().await {
                        log::debug!("telegram delete_webhook on shutdown: {}", e);
                    }
                    served
                }
                Err(e) => Err(anyhow::Error::new(e).context("registering telegram webhook")),
            }
        }
        None => {
            if let Err(e) = telegram.delete_webhook().await {
                log::warn!("telegram: could not clear webhook before polling: {}", e);
            }
            telegram.run_polling(&dispatcher, cancel.clone()).await;
            Ok(())
        }
    };

    cancel.cancel();
    dispatcher.shutdown().await;
    let _ = keepalive.await;
    if let Err(e) = deriv.close().await {
        log::warn!("deriv: close failed: {}", e);
    }
    log::info!("bot stopped");
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_fallback_depends_on_backend() {
        assert_eq!(resolve_model(None, LlmBackendKind::Ollama), DEFAULT_MODEL);
        assert_eq!(
            resolve_model(Some("  "), LlmBackendKind::LmStudio),
            DEFAULT_LMSTUDIO_MODEL
        );
        assert_eq!(resolve_model(Some("qwen3:8b"), LlmBackendKind::Ollama), "qwen3:8b");
    }
}
