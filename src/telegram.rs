//! Telegram transport
//!
//! Long polling via teloxide. Updates are turned into [`Inbound`] values at
//! this boundary; anything malformed (unknown buttons, non-text messages,
//! unknown commands) is dropped here and never reaches a conversation.

use crate::commands::Command;
use crate::runtime::{
    ChannelRef, ChatTransport, Inbound, InboundKind, Ledger, RuntimeManager, SessionStore,
    TransportError,
};
use crate::state_machine::{ButtonToken, Keyboard};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, Recipient};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

/// Outbound side: sends and edits through the Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                InlineKeyboardButton::callback(button.label.clone(), button.token.callback_data())
            })
            .collect::<Vec<_>>()
    }))
}

fn map_error(err: RequestError) -> TransportError {
    match err {
        RequestError::Api(ApiError::MessageCantBeEdited) => TransportError::NotEditable,
        other => TransportError::Request(other.to_string()),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        let request = match keyboard {
            Some(kb) => request.reply_markup(to_markup(kb)),
            None => request,
        };
        request.await.map(|_| ()).map_err(map_error)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        let request = match keyboard {
            Some(kb) => request.reply_markup(to_markup(kb)),
            None => request,
        };
        request.await.map(|_| ()).map_err(map_error)
    }

    async fn post(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError> {
        let recipient = match channel {
            ChannelRef::Id(id) => Recipient::Id(ChatId(*id)),
            ChannelRef::Username(name) => Recipient::ChannelUsername(name.clone()),
        };
        self.bot
            .send_message(recipient, text)
            .await
            .map(|_| ())
            .map_err(map_error)
    }
}

// ============================================================================
// Inbound
// ============================================================================

fn user_id_of(user: &teloxide::types::User) -> Option<i64> {
    i64::try_from(user.id.0).ok()
}

/// Text message to inbound update; `None` for anything we do not handle
fn message_to_inbound(msg: &Message) -> Option<Inbound> {
    let user_id = user_id_of(msg.from.as_ref()?)?;
    let text = msg.text()?;

    let kind = if text.starts_with('/') {
        InboundKind::Command(Command::parse(text)?)
    } else {
        InboundKind::Text(text.to_string())
    };

    Some(Inbound {
        user_id,
        chat_id: msg.chat.id.0,
        kind,
    })
}

fn callback_to_inbound(q: &CallbackQuery) -> Option<Inbound> {
    let user_id = user_id_of(&q.from)?;
    let token = ButtonToken::parse(q.data.as_deref()?)?;
    let message = q.regular_message();

    Some(Inbound {
        user_id,
        chat_id: message.map_or(user_id, |m| m.chat.id.0),
        kind: InboundKind::Button {
            token,
            message_id: message.map(|m| m.id.0),
        },
    })
}

/// Poll for updates until Ctrl-C, feeding them to the runtime manager
pub async fn run_polling<L, S, T>(bot: Bot, manager: Arc<RuntimeManager<L, S, T>>)
where
    L: Ledger + 'static,
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    info!("Starting Telegram long polling");

    let message_manager = Arc::clone(&manager);
    let callback_manager = manager;

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(move |msg: Message| {
            let manager = Arc::clone(&message_manager);
            async move {
                match message_to_inbound(&msg) {
                    Some(inbound) => manager.dispatch(inbound).await,
                    None => debug!(msg_id = msg.id.0, "Ignoring unsupported message"),
                }
                respond(())
            }
        }))
        .branch(
            Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                let manager = Arc::clone(&callback_manager);
                async move {
                    // Stop the client's spinner whatever the payload
                    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
                        warn!(error = %e, "Failed to answer callback query");
                    }
                    match callback_to_inbound(&q) {
                        Some(inbound) => manager.dispatch(inbound).await,
                        None => debug!(data = ?q.data, "Ignoring malformed callback"),
                    }
                    respond(())
                }
            }),
        );

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Telegram polling stopped");
}
