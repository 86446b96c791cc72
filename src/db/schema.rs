//! Database schema and types

use crate::routing::Destination;
use crate::state_machine::Gender;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// SQL schema for initialization
///
/// Money columns hold integer cents.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    telegram_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    balance_cents INTEGER NOT NULL DEFAULT 0 CHECK (balance_cents >= 0),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    order_number INTEGER PRIMARY KEY,
    cafe TEXT NOT NULL,
    name TEXT NOT NULL,
    gender TEXT NOT NULL,
    phone TEXT NOT NULL,
    requested_time TEXT NOT NULL,
    food TEXT NOT NULL,
    place TEXT NOT NULL,
    total_items INTEGER NOT NULL,
    total_price_cents INTEGER NOT NULL,
    user_telegram_id INTEGER NOT NULL,
    destination TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_telegram_id, created_at DESC);

CREATE TABLE IF NOT EXISTS order_counter (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last INTEGER NOT NULL
);
";

/// First order number handed out on an empty database
pub const FIRST_ORDER_NUMBER: i64 = 1000;

/// Registered customer
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub telegram_id: i64,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A confirmed order ready to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_number: i64,
    pub cafe: String,
    pub name: String,
    pub gender: Gender,
    pub phone: String,
    pub requested_time: String,
    pub food: String,
    pub place: String,
    pub total_items: u32,
    pub total_price: Decimal,
    pub user_telegram_id: i64,
    pub destination: Destination,
}

/// What the ledger reports back after a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderReceipt {
    pub created_at: DateTime<Utc>,
    pub balance_after: Decimal,
}

/// Result of the debit-and-insert transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(OrderReceipt),
    /// Nothing was written
    InsufficientFunds { balance: Decimal },
}

/// Row shown in a customer's order history
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_number: i64,
    pub cafe: String,
    pub total_items: u32,
    pub total_price: Decimal,
    pub destination: String,
    pub created_at: DateTime<Utc>,
}
