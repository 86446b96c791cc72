//! Conversation service: runs transitions and executes their effects

use super::traits::{ChannelRef, ChatTransport, Ledger, SessionStore};
use super::{Inbound, InboundKind};
use crate::commands::{self, AccessPolicy, Command};
use crate::db::CommitOutcome;
use crate::messages;
use crate::routing::Destination;
use crate::state_machine::{
    transition, ConvContext, ConvSettings, Effect, Event, Keyboard, Session, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Retry schedule for channel notices: `base_delay`, doubled per attempt
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Everything the service needs besides its I/O
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub conversation: Arc<ConvSettings>,
    pub access: AccessPolicy,
    /// Address per delivery channel; missing destinations are skipped
    pub channels: HashMap<Destination, ChannelRef>,
    pub notify_retry: RetryPolicy,
}

/// Where the triggering update came from, for replies and edits
#[derive(Debug, Clone, Copy)]
struct Origin {
    chat_id: i64,
    message_id: Option<i32>,
}

/// Generic conversation service that can work with any ledger, session
/// store and chat transport
pub struct ConversationService<L, S, T>
where
    L: Ledger + 'static,
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    settings: ServiceSettings,
    ledger: Arc<L>,
    sessions: Arc<S>,
    transport: Arc<T>,
    notifications: TaskTracker,
}

impl<L, S, T> ConversationService<L, S, T>
where
    L: Ledger + 'static,
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    pub fn new(settings: ServiceSettings, ledger: Arc<L>, sessions: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            settings,
            ledger,
            sessions,
            transport,
            notifications: TaskTracker::new(),
        }
    }

    /// Handle one inbound update to completion
    pub async fn handle(&self, inbound: Inbound) {
        let Inbound {
            user_id,
            chat_id,
            kind,
        } = inbound;
        tracing::debug!(user_id, kind = kind.name(), "Handling inbound update");

        match kind {
            InboundKind::Command(Command::Start) => {
                let policy = &self.settings.access;
                match policy.is_authorized(self.ledger.as_ref(), user_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(user_id, "Unregistered user tried to start");
                        let text = messages::not_registered(&policy.support_contact);
                        self.send(chat_id, &text, None).await;
                        return;
                    }
                    Err(e) => {
                        tracing::error!(user_id, error = %e, "Authorization lookup failed");
                        self.send(chat_id, &messages::temporary_failure(), None).await;
                        return;
                    }
                }
                let origin = Origin { chat_id, message_id: None };
                self.run_conversation(user_id, origin, Event::Start).await;
            }
            InboundKind::Command(Command::Cancel) => {
                let origin = Origin { chat_id, message_id: None };
                self.run_conversation(user_id, origin, Event::Cancel).await;
            }
            InboundKind::Command(command) => {
                let reply =
                    commands::execute(self.ledger.as_ref(), &self.settings.access, user_id, &command)
                        .await;
                if let Some(text) = reply {
                    self.send(chat_id, &text, None).await;
                }
            }
            InboundKind::Text(text) => {
                let origin = Origin { chat_id, message_id: None };
                self.run_conversation(user_id, origin, Event::Text(text)).await;
            }
            InboundKind::Button { token, message_id } => {
                let origin = Origin { chat_id, message_id };
                self.run_conversation(user_id, origin, Event::Button(token)).await;
            }
        }
    }

    /// Wait for in-flight channel notices, e.g. before shutdown
    pub async fn drain_notifications(&self) {
        self.notifications.close();
        self.notifications.wait().await;
    }

    async fn run_conversation(&self, user_id: UserId, origin: Origin, event: Event) {
        let mut session = match self.sessions.get(user_id).await {
            Ok(found) => found.unwrap_or_else(|| Session::new(user_id)),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load session");
                self.send(origin.chat_id, &messages::temporary_failure(), None).await;
                return;
            }
        };
        let context = ConvContext::new(user_id, Arc::clone(&self.settings.conversation));

        // Effects may feed events back (ledger answers); process them in a loop
        let mut events_to_process = vec![event];
        while let Some(current_event) = events_to_process.pop() {
            let event_kind = current_event.kind();
            let result = match transition(&session, &context, current_event) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(user_id, state = session.state.name(), error = %e, "Ignoring event");
                    break;
                }
            };

            tracing::debug!(
                user_id,
                event = event_kind,
                from = session.state.name(),
                to = result.session.state.name(),
                "Transition"
            );
            session = result.session;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(user_id, origin, effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        let saved = if session.state.is_terminal() {
            self.sessions.delete(user_id).await
        } else {
            self.sessions.put(session).await
        };
        if let Err(e) = saved {
            tracing::error!(user_id, error = %e, "Failed to save session");
        }
    }

    async fn execute_effect(&self, user_id: UserId, origin: Origin, effect: Effect) -> Option<Event> {
        match effect {
            Effect::Reply { text, keyboard } => {
                self.send(origin.chat_id, &text, keyboard.as_ref()).await;
                None
            }

            Effect::EditPrompt { text, keyboard } => {
                let Some(message_id) = origin.message_id else {
                    self.send(origin.chat_id, &text, keyboard.as_ref()).await;
                    return None;
                };
                if let Err(e) = self
                    .transport
                    .edit_text(origin.chat_id, message_id, &text, keyboard.as_ref())
                    .await
                {
                    tracing::warn!(user_id, error = %e, "Edit failed, sending instead");
                    self.send(origin.chat_id, &text, keyboard.as_ref()).await;
                }
                None
            }

            Effect::AllocateOrderNumber => match self.ledger.next_order_number().await {
                Ok(order_number) => {
                    tracing::debug!(user_id, order_number, "Order number allocated");
                    Some(Event::OrderNumberAllocated { order_number })
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "Order number allocation failed");
                    Some(Event::LedgerFailed { message: e.message })
                }
            },

            Effect::CommitOrder { order } => match self.ledger.commit_order(&order).await {
                Ok(CommitOutcome::Committed(receipt)) => {
                    tracing::info!(
                        user_id,
                        order_number = order.order_number,
                        destination = %order.destination,
                        total = %order.total_price,
                        "Order committed"
                    );
                    Some(Event::CommitSucceeded { receipt })
                }
                Ok(CommitOutcome::InsufficientFunds { balance }) => {
                    tracing::info!(
                        user_id,
                        order_number = order.order_number,
                        balance = %balance,
                        total = %order.total_price,
                        "Order declined, insufficient balance"
                    );
                    Some(Event::CommitDeclined { balance })
                }
                Err(e) => {
                    tracing::error!(user_id, order_number = order.order_number, error = %e, "Order commit failed");
                    Some(Event::LedgerFailed { message: e.message })
                }
            },

            Effect::Notify { destination, text } => {
                self.notify(destination, text);
                None
            }
        }
    }

    /// Deliver a channel notice in the background, retrying on failure
    fn notify(&self, destination: Destination, text: String) {
        let Some(channel) = self.settings.channels.get(&destination).cloned() else {
            tracing::warn!(%destination, "No channel configured, order notice skipped");
            return;
        };
        let transport = Arc::clone(&self.transport);
        let retry = self.settings.notify_retry;
        self.notifications.spawn(async move {
            deliver_with_retry(transport.as_ref(), &channel, &text, retry).await;
        });
    }

    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) {
        if let Err(e) = self.transport.send_text(chat_id, text, keyboard).await {
            tracing::error!(chat_id, error = %e, "Failed to send message");
        }
    }
}

async fn deliver_with_retry<T: ChatTransport + ?Sized>(
    transport: &T,
    channel: &ChannelRef,
    text: &str,
    retry: RetryPolicy,
) {
    let attempts = retry.max_attempts.max(1);
    for attempt in 1..=attempts {
        match transport.post(channel, text).await {
            Ok(()) => {
                tracing::debug!(%channel, attempt, "Order notice delivered");
                return;
            }
            Err(e) if attempt < attempts => {
                let delay = retry.delay_after(attempt);
                tracing::warn!(
                    %channel,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Order notice failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(%channel, attempt, error = %e, "Order notice failed, giving up");
            }
        }
    }
}
