//! Fan-in of transport updates: one sequential worker per chat, chats served concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::bot::{DispatchError, OutboundResponse, Router, DISPATCH_FAILED_TEXT};
use crate::channels::{ChatTransport, Incoming};

const WORKER_QUEUE: usize = 32;
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Reply to a message that arrived while its chat's queue was full.
pub const CHAT_BUSY_TEXT: &str = "⏳ Still working on your earlier messages. Please try again shortly.";

/// Periodic "typing" chat action, owned by one dispatch. The refresh task is a child of the
/// dispatch's token: [`stop`](Self::stop) cancels and joins it, dropping only cancels.
pub struct TypingIndicator {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TypingIndicator {
    pub fn start(
        transport: Arc<dyn ChatTransport>,
        chat_id: i64,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let interval = interval.max(Duration::from_secs(1));
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    r = transport.send_typing(chat_id) => {
                        if let Err(e) = r {
                            log::debug!("typing indicator for chat {}: {}", chat_id, e);
                        }
                    }
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct Workers {
    senders: HashMap<i64, mpsc::Sender<Incoming>>,
    tasks: JoinSet<()>,
}

/// Routes each update to its chat's worker; the worker dispatches and sends the reply.
///
/// `submit` never waits on a worker: a chat whose queue is full gets [`CHAT_BUSY_TEXT`] instead,
/// so one slow chat cannot hold up the transport. Workers exit after `idle_timeout` without
/// updates and are started again on the chat's next message.
pub struct UpdateDispatcher {
    router: Arc<Router>,
    transport: Arc<dyn ChatTransport>,
    cancel: CancellationToken,
    typing_interval: Duration,
    idle_timeout: Duration,
    workers: Arc<Mutex<Workers>>,
}

impl UpdateDispatcher {
    pub fn new(
        router: Arc<Router>,
        transport: Arc<dyn ChatTransport>,
        cancel: CancellationToken,
        typing_interval: Duration,
    ) -> Self {
        Self {
            router,
            transport,
            cancel,
            typing_interval,
            idle_timeout: WORKER_IDLE_TIMEOUT,
            workers: Arc::new(Mutex::new(Workers::default())),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Chats that currently have a running worker.
    pub async fn active_chats(&self) -> usize {
        self.workers.lock().await.senders.len()
    }

    /// Queue `incoming` behind earlier updates from the same chat. Dropped after shutdown.
    pub async fn submit(&self, incoming: Incoming) {
        if self.cancel.is_cancelled() {
            log::debug!("dispatcher: shutting down, dropping update");
            return;
        }
        let chat_id = incoming.message.chat_id;
        let mut workers = self.workers.lock().await;
        while workers.tasks.try_join_next().is_some() {}

        let tx = match workers.senders.get(&chat_id) {
            Some(tx) if !tx.is_closed() => tx.clone(),
            _ => {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE);
                let worker = ChatWorker {
                    chat_id,
                    router: self.router.clone(),
                    transport: self.transport.clone(),
                    cancel: self.cancel.clone(),
                    typing_interval: self.typing_interval,
                    idle_timeout: self.idle_timeout,
                    workers: self.workers.clone(),
                };
                workers.tasks.spawn(worker.run(rx));
                workers.senders.insert(chat_id, tx.clone());
                tx
            }
        };
        // Sent under the lock so an idle worker cannot retire between lookup and send.
        let rejected = match tx.try_send(incoming) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(incoming)) => Some(incoming),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("dispatcher: worker for chat {} is gone", chat_id);
                None
            }
        };
        drop(workers);

        if let Some(incoming) = rejected {
            log::warn!(
                "dispatcher: queue for chat {} is full, rejecting message {}",
                chat_id,
                incoming.message.message_id
            );
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let busy = OutboundResponse::reply(&incoming.message, CHAT_BUSY_TEXT);
                if let Err(e) = transport.send_response(&busy).await {
                    log::debug!("dispatcher: busy reply to chat {} failed: {}", chat_id, e);
                }
            });
        }
    }

    /// Cancel in-flight dispatches, close every queue and wait for the workers to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = {
            let mut workers = self.workers.lock().await;
            workers.senders.clear();
            std::mem::take(&mut workers.tasks)
        };
        while tasks.join_next().await.is_some() {}
        log::info!("dispatcher: all chat workers stopped");
    }
}

struct ChatWorker {
    chat_id: i64,
    router: Arc<Router>,
    transport: Arc<dyn ChatTransport>,
    cancel: CancellationToken,
    typing_interval: Duration,
    idle_timeout: Duration,
    workers: Arc<Mutex<Workers>>,
}

impl ChatWorker {
    async fn run(self, mut rx: mpsc::Receiver<Incoming>) {
        log::debug!("dispatcher: worker for chat {} started", self.chat_id);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = tokio::time::timeout(self.idle_timeout, rx.recv()) => next,
            };
            let incoming = match next {
                Ok(Some(incoming)) => incoming,
                Ok(None) => break,
                Err(_) => match self.retire(&mut rx).await {
                    Some(incoming) => incoming,
                    None => break,
                },
            };
            self.handle(incoming).await;
        }
        log::debug!("dispatcher: worker for chat {} stopped", self.chat_id);
    }

    /// Idle: unregister unless an update slipped in meanwhile, which is returned instead.
    async fn retire(&self, rx: &mut mpsc::Receiver<Incoming>) -> Option<Incoming> {
        let mut workers = self.workers.lock().await;
        if let Ok(incoming) = rx.try_recv() {
            return Some(incoming);
        }
        rx.close();
        let ours = workers
            .senders
            .get(&self.chat_id)
            .is_some_and(|tx| tx.is_closed());
        if ours {
            workers.senders.remove(&self.chat_id);
        }
        None
    }

    async fn handle(&self, incoming: Incoming) {
        let msg = &incoming.message;
        if let Some(id) = &incoming.callback_query_id {
            if let Err(e) = self.transport.answer_callback(id).await {
                log::debug!("answerCallbackQuery failed: {}", e);
            }
        }

        let typing = (!incoming.is_callback()).then(|| {
            TypingIndicator::start(
                self.transport.clone(),
                msg.chat_id,
                self.typing_interval,
                &self.cancel,
            )
        });
        let result = self.router.dispatch(&self.cancel, msg).await;
        if let Some(typing) = typing {
            typing.stop().await;
        }

        let response = match result {
            Ok(response) => response,
            Err(DispatchError::Cancelled) => {
                log::debug!("dispatcher: dispatch in chat {} cancelled", msg.chat_id);
                return;
            }
            Err(e) => {
                log::warn!(
                    "dispatcher: command failed in chat {} (user {:?}): {:#}",
                    msg.chat_id,
                    msg.username,
                    anyhow::Error::new(e)
                );
                OutboundResponse::reply(msg, DISPATCH_FAILED_TEXT)
            }
        };
        if let Err(e) = self.transport.send_response(&response).await {
            log::warn!("dispatcher: sending reply to chat {} failed: {}", msg.chat_id, e);
        }
    }
}
