//! Database module for the delivery ledger
//!
//! Provides persistence for customers, balances and orders.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("User not found: {0}")]
    UserNotFound(i64),
    #[error("User already exists: {0}")]
    UserExists(i64),
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Whether the user is in the users table
    pub fn is_registered(&self, telegram_id: i64) -> DbResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT telegram_id FROM users WHERE telegram_id = ?1",
                params![telegram_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Register a user with an opening balance
    pub fn add_user(&self, telegram_id: i64, name: &str, initial_balance: Decimal) -> DbResult<User> {
        let cents = to_cents(initial_balance)?;
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (telegram_id, name, balance_cents, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![telegram_id, name, cents, now.to_rfc3339()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                DbError::UserExists(telegram_id)
            }
            other => DbError::Sqlite(other),
        })?;

        Ok(User {
            telegram_id,
            name: name.to_string(),
            balance: from_cents(cents),
            created_at: now,
        })
    }

    #[allow(dead_code)] // Used in tests
    pub fn get_user(&self, telegram_id: i64) -> DbResult<User> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT telegram_id, name, balance_cents, created_at FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            |row| {
                Ok(User {
                    telegram_id: row.get(0)?,
                    name: row.get(1)?,
                    balance: from_cents(row.get(2)?),
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::UserNotFound(telegram_id),
            other => DbError::Sqlite(other),
        })
    }

    pub fn get_balance(&self, telegram_id: i64) -> DbResult<Decimal> {
        let conn = self.conn()?;
        read_balance(&conn, telegram_id)?.ok_or(DbError::UserNotFound(telegram_id))
    }

    /// Overwrite a balance
    pub fn set_balance(&self, telegram_id: i64, balance: Decimal) -> DbResult<()> {
        let cents = to_cents(balance)?;
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET balance_cents = ?1 WHERE telegram_id = ?2",
            params![cents, telegram_id],
        )?;
        if updated == 0 {
            return Err(DbError::UserNotFound(telegram_id));
        }
        Ok(())
    }

    /// Add to a balance in a single statement, returning the new balance
    pub fn credit_balance(&self, telegram_id: i64, amount: Decimal) -> DbResult<Decimal> {
        let cents = to_cents(amount)?;
        let conn = self.conn()?;
        let balance: Option<i64> = conn
            .query_row(
                "UPDATE users SET balance_cents = balance_cents + ?1 WHERE telegram_id = ?2
                 RETURNING balance_cents",
                params![cents, telegram_id],
                |row| row.get(0),
            )
            .optional()?;
        balance
            .map(from_cents)
            .ok_or(DbError::UserNotFound(telegram_id))
    }

    // ==================== Order Operations ====================

    /// Reserve the next order number.
    ///
    /// The counter row is seeded from the highest stored order so numbering
    /// continues across an existing table, starting at 1000 when empty.
    pub fn next_order_number(&self) -> DbResult<i64> {
        let conn = self.conn()?;
        let number = conn.query_row(
            "INSERT INTO order_counter (id, last)
             VALUES (1, (SELECT COALESCE(MAX(order_number) + 1, ?1) FROM orders))
             ON CONFLICT(id) DO UPDATE SET last = MAX(last + 1, excluded.last)
             RETURNING last",
            params![FIRST_ORDER_NUMBER],
            |row| row.get(0),
        )?;
        Ok(number)
    }

    /// Debit the order total and store the order, atomically.
    ///
    /// The debit only applies while the balance covers the total; otherwise
    /// the transaction is rolled back and nothing is written.
    pub fn commit_order(&self, order: &NewOrder) -> DbResult<CommitOutcome> {
        let price = to_cents(order.total_price)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let debited = tx.execute(
            "UPDATE users SET balance_cents = balance_cents - ?1
             WHERE telegram_id = ?2 AND balance_cents >= ?1",
            params![price, order.user_telegram_id],
        )?;

        if debited == 0 {
            let balance = read_balance(&tx, order.user_telegram_id)?.unwrap_or_default();
            return Ok(CommitOutcome::InsufficientFunds { balance });
        }

        let created_at = Utc::now();
        insert_order(&tx, order, price, created_at)?;
        let balance_after = read_balance(&tx, order.user_telegram_id)?.unwrap_or_default();
        tx.commit()?;

        Ok(CommitOutcome::Committed(OrderReceipt {
            created_at,
            balance_after,
        }))
    }

    /// Most recent orders placed by a user
    pub fn list_orders_for_user(&self, telegram_id: i64, limit: u32) -> DbResult<Vec<OrderSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT order_number, cafe, total_items, total_price_cents, destination, created_at
             FROM orders
             WHERE user_telegram_id = ?1
             ORDER BY created_at DESC, order_number DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![telegram_id, limit], |row| {
            Ok(OrderSummary {
                order_number: row.get(0)?,
                cafe: row.get(1)?,
                total_items: row.get(2)?,
                total_price: from_cents(row.get(3)?),
                destination: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })?;

        let orders = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }
}

fn read_balance(conn: &Connection, telegram_id: i64) -> DbResult<Option<Decimal>> {
    let cents: Option<i64> = conn
        .query_row(
            "SELECT balance_cents FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(cents.map(from_cents))
}

fn insert_order(
    tx: &Transaction<'_>,
    order: &NewOrder,
    price_cents: i64,
    created_at: DateTime<Utc>,
) -> DbResult<()> {
    tx.execute(
        "INSERT INTO orders (order_number, cafe, name, gender, phone, requested_time, food, place,
                             total_items, total_price_cents, user_telegram_id, destination, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            order.order_number,
            order.cafe,
            order.name,
            order.gender.code(),
            order.phone,
            order.requested_time,
            order.food,
            order.place,
            order.total_items,
            price_cents,
            order.user_telegram_id,
            order.destination.as_str(),
            created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Amounts are stored as whole cents; negative amounts are rejected
fn to_cents(amount: Decimal) -> DbResult<i64> {
    if amount.is_sign_negative() {
        return Err(DbError::InvalidAmount(amount));
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.round().to_i64())
        .ok_or(DbError::InvalidAmount(amount))
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
