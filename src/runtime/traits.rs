//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the service with mock implementations.

use crate::db::{CommitOutcome, Database, DbError, NewOrder, OrderSummary};
use crate::state_machine::{Keyboard, Session, UserId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    /// Store unreachable or locked
    Unavailable,
    /// Key already present
    Duplicate,
    NotFound,
    /// Write refused (bad amount, constraint)
    Rejected,
}

/// Failure reported by the ledger; never fatal to the process
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct LedgerError {
    pub kind: LedgerErrorKind,
    pub message: String,
}

impl LedgerError {
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Unavailable, message)
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        let kind = match &err {
            DbError::UserExists(_) => LedgerErrorKind::Duplicate,
            DbError::UserNotFound(_) => LedgerErrorKind::NotFound,
            DbError::InvalidAmount(_) => LedgerErrorKind::Rejected,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                LedgerErrorKind::Rejected
            }
            DbError::Sqlite(_) | DbError::LockPoisoned => LedgerErrorKind::Unavailable,
        };
        Self::new(kind, err.to_string())
    }
}

/// Delivery channel address: numeric chat id or public `@username`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Id(i64),
    Username(String),
}

impl ChannelRef {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Ok(id) = value.parse() {
            return Some(ChannelRef::Id(id));
        }
        let name = value.strip_prefix('@').unwrap_or(value);
        let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| ChannelRef::Username(format!("@{name}")))
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Username(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Chat request failed: {0}")]
    Request(String),
    #[error("Message can no longer be edited")]
    NotEditable,
}

// ============================================================================
// Traits
// ============================================================================

/// Balances, order numbers and order records
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether the user is in the users table
    async fn is_registered(&self, user: UserId) -> Result<bool, LedgerError>;

    async fn balance(&self, user: UserId) -> Result<Decimal, LedgerError>;

    async fn set_balance(&self, user: UserId, amount: Decimal) -> Result<(), LedgerError>;

    /// Add to a balance, returning the new balance
    async fn credit(&self, user: UserId, amount: Decimal) -> Result<Decimal, LedgerError>;

    async fn add_user(
        &self,
        user: UserId,
        name: &str,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError>;

    async fn next_order_number(&self) -> Result<i64, LedgerError>;

    /// Debit and insert as one unit; a short balance writes nothing
    async fn commit_order(&self, order: &NewOrder) -> Result<CommitOutcome, LedgerError>;

    async fn recent_orders(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, LedgerError>;
}

/// Per-user conversation sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user: UserId) -> Result<Option<Session>, String>;

    async fn put(&self, session: Session) -> Result<(), String>;

    async fn delete(&self, user: UserId) -> Result<(), String>;
}

/// Outbound chat actions
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a new message to a user chat
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    /// Replace the text (and buttons) of an existing message
    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    /// Post an order notice to a delivery channel
    async fn post(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn is_registered(&self, user: UserId) -> Result<bool, LedgerError> {
        (**self).is_registered(user).await
    }

    async fn balance(&self, user: UserId) -> Result<Decimal, LedgerError> {
        (**self).balance(user).await
    }

    async fn set_balance(&self, user: UserId, amount: Decimal) -> Result<(), LedgerError> {
        (**self).set_balance(user, amount).await
    }

    async fn credit(&self, user: UserId, amount: Decimal) -> Result<Decimal, LedgerError> {
        (**self).credit(user, amount).await
    }

    async fn add_user(
        &self,
        user: UserId,
        name: &str,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError> {
        (**self).add_user(user, name, initial_balance).await
    }

    async fn next_order_number(&self) -> Result<i64, LedgerError> {
        (**self).next_order_number().await
    }

    async fn commit_order(&self, order: &NewOrder) -> Result<CommitOutcome, LedgerError> {
        (**self).commit_order(order).await
    }

    async fn recent_orders(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, LedgerError> {
        (**self).recent_orders(user, limit).await
    }
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get(&self, user: UserId) -> Result<Option<Session>, String> {
        (**self).get(user).await
    }

    async fn put(&self, session: Session) -> Result<(), String> {
        (**self).put(session).await
    }

    async fn delete(&self, user: UserId) -> Result<(), String> {
        (**self).delete(user).await
    }
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        (**self).send_text(chat_id, text, keyboard).await
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        (**self).edit_text(chat_id, message_id, text, keyboard).await
    }

    async fn post(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError> {
        (**self).post(channel, text).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a Ledger
#[derive(Clone)]
pub struct DatabaseLedger {
    db: Database,
}

impl DatabaseLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Ledger for DatabaseLedger {
    async fn is_registered(&self, user: UserId) -> Result<bool, LedgerError> {
        Ok(self.db.is_registered(user)?)
    }

    async fn balance(&self, user: UserId) -> Result<Decimal, LedgerError> {
        Ok(self.db.get_balance(user)?)
    }

    async fn set_balance(&self, user: UserId, amount: Decimal) -> Result<(), LedgerError> {
        Ok(self.db.set_balance(user, amount)?)
    }

    async fn credit(&self, user: UserId, amount: Decimal) -> Result<Decimal, LedgerError> {
        Ok(self.db.credit_balance(user, amount)?)
    }

    async fn add_user(
        &self,
        user: UserId,
        name: &str,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError> {
        self.db.add_user(user, name, initial_balance)?;
        Ok(())
    }

    async fn next_order_number(&self) -> Result<i64, LedgerError> {
        Ok(self.db.next_order_number()?)
    }

    async fn commit_order(&self, order: &NewOrder) -> Result<CommitOutcome, LedgerError> {
        Ok(self.db.commit_order(order)?)
    }

    async fn recent_orders(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, LedgerError> {
        Ok(self.db.list_orders_for_user(user, limit)?)
    }
}
