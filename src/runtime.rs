//! Runtime for executing conversations
//!
//! Each user gets a worker task fed by a channel, so that user's updates
//! are handled one at a time in arrival order while different users run
//! concurrently.

mod executor;
mod sessions;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ConversationService, RetryPolicy, ServiceSettings};
pub use sessions::InMemorySessionStore;
pub use traits::*;

use crate::commands::Command;
use crate::state_machine::{ButtonToken, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Per-user queue depth; updates beyond it are dropped
const WORKER_QUEUE: usize = 32;

/// An update from the chat platform, already parsed at the transport boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub user_id: UserId,
    pub chat_id: i64,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundKind {
    Command(Command),
    /// Free text that is not a command
    Text(String),
    Button {
        token: ButtonToken,
        /// Message carrying the pressed button, when still accessible
        message_id: Option<i32>,
    },
}

impl InboundKind {
    pub fn name(&self) -> &'static str {
        match self {
            InboundKind::Command(command) => command.name(),
            InboundKind::Text(_) => "text",
            InboundKind::Button { .. } => "button",
        }
    }
}

type Workers = Arc<Mutex<HashMap<UserId, mpsc::Sender<Inbound>>>>;

/// Manager for all per-user workers
pub struct RuntimeManager<L, S, T>
where
    L: Ledger + 'static,
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    service: Arc<ConversationService<L, S, T>>,
    workers: Workers,
    idle_timeout: Duration,
}

impl<L, S, T> RuntimeManager<L, S, T>
where
    L: Ledger + 'static,
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    pub fn new(service: Arc<ConversationService<L, S, T>>, idle_timeout: Duration) -> Self {
        Self {
            service,
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Queue an update on its user's worker, starting one if needed.
    ///
    /// Sends happen under the worker map lock, and a worker only retires
    /// under the same lock with an empty queue, so nothing is lost between
    /// an idle exit and a respawn.
    pub async fn dispatch(&self, inbound: Inbound) {
        let user_id = inbound.user_id;
        let mut workers = self.workers.lock().await;

        let inbound = match workers.get(&user_id) {
            Some(tx) => match tx.try_send(inbound) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(user_id, "Worker queue full, dropping update");
                    return;
                }
                Err(mpsc::error::TrySendError::Closed(inbound)) => inbound,
            },
            None => inbound,
        };

        let (tx, rx) = mpsc::channel(WORKER_QUEUE);
        if tx.try_send(inbound).is_err() {
            return;
        }
        workers.insert(user_id, tx);
        drop(workers);

        tracing::debug!(user_id, "Starting conversation worker");
        tokio::spawn(run_worker(
            user_id,
            rx,
            Arc::clone(&self.service),
            Arc::clone(&self.workers),
            self.idle_timeout,
        ));
    }

    #[allow(dead_code)] // Used in tests
    pub async fn active_workers(&self) -> usize {
        self.workers.lock().await.len()
    }
}

async fn run_worker<L, S, T>(
    user_id: UserId,
    mut rx: mpsc::Receiver<Inbound>,
    service: Arc<ConversationService<L, S, T>>,
    workers: Workers,
    idle_timeout: Duration,
) where
    L: Ledger + 'static,
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(inbound)) => service.handle(inbound).await,
            Ok(None) => break,
            Err(_) => {
                let mut map = workers.lock().await;
                if rx.is_empty() {
                    map.remove(&user_id);
                    break;
                }
            }
        }
    }
    tracing::debug!(user_id, "Conversation worker stopped");
}
