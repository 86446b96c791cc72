//! Slash commands outside the ordering conversation
//!
//! `/start` and `/cancel` drive the state machine; everything else is a
//! one-shot request against the ledger answered with a single message.

use crate::messages;
use crate::runtime::{Ledger, LedgerError, LedgerErrorKind};
use crate::state_machine::UserId;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// How many orders `/orders` lists
pub const ORDER_HISTORY_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    Balance,
    Orders,
    /// Admin: `/add_user <telegram_id> <balance>`
    AddUser(String),
    /// Admin: `/topup <telegram_id> <amount>`
    TopUp(String),
    /// Admin: `/setbalance <telegram_id> <balance>`
    SetBalance(String),
}

impl Command {
    /// Parse a `/command args` message; `None` for plain text or unknown commands.
    ///
    /// A `@botname` suffix on the command word is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let (word, args) = match rest.split_once(char::is_whitespace) {
            Some((word, args)) => (word, args.trim().to_string()),
            None => (rest, String::new()),
        };
        let name = word.split('@').next().unwrap_or(word);

        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "cancel" => Some(Command::Cancel),
            "balance" => Some(Command::Balance),
            "orders" => Some(Command::Orders),
            "add_user" => Some(Command::AddUser(args)),
            "topup" => Some(Command::TopUp(args)),
            "setbalance" => Some(Command::SetBalance(args)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Cancel => "cancel",
            Command::Balance => "balance",
            Command::Orders => "orders",
            Command::AddUser(_) => "add_user",
            Command::TopUp(_) => "topup",
            Command::SetBalance(_) => "setbalance",
        }
    }
}

/// Who may do what
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub admins: HashSet<UserId>,
    pub support_contact: String,
}

impl AccessPolicy {
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Admins, plus everyone in the users table
    pub async fn is_authorized<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        user: UserId,
    ) -> Result<bool, LedgerError> {
        if self.is_admin(user) {
            return Ok(true);
        }
        ledger.is_registered(user).await
    }
}

/// `<telegram_id> <amount>` with a non-negative amount
fn parse_user_amount(args: &str) -> Option<(UserId, Decimal)> {
    let mut parts = args.split_whitespace();
    let user = parts.next()?.parse().ok()?;
    let amount: Decimal = parts.next()?.parse().ok()?;
    if parts.next().is_some() || amount.is_sign_negative() {
        return None;
    }
    Some((user, amount))
}

/// Run a one-shot command and return the reply.
///
/// Returns `None` for the commands that belong to the conversation.
pub async fn execute<L: Ledger + ?Sized>(
    ledger: &L,
    policy: &AccessPolicy,
    user: UserId,
    command: &Command,
) -> Option<String> {
    let reply = match command {
        Command::Start | Command::Cancel => return None,
        Command::Balance => balance(ledger, policy, user).await,
        Command::Orders => orders(ledger, policy, user).await,
        Command::AddUser(args) => admin(policy, user, || add_user(ledger, args)).await,
        Command::TopUp(args) => admin(policy, user, || top_up(ledger, args)).await,
        Command::SetBalance(args) => admin(policy, user, || set_balance(ledger, args)).await,
    };
    Some(reply)
}

async fn admin<F, Fut>(policy: &AccessPolicy, user: UserId, run: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = String>,
{
    if !policy.is_admin(user) {
        tracing::info!(user_id = user, "Admin command refused");
        return messages::admin_only();
    }
    run().await
}

async fn balance<L: Ledger + ?Sized>(ledger: &L, policy: &AccessPolicy, user: UserId) -> String {
    match policy.is_authorized(ledger, user).await {
        Ok(true) => {}
        Ok(false) => return messages::not_registered(&policy.support_contact),
        Err(e) => {
            tracing::error!(user_id = user, error = %e, "Authorization lookup failed");
            return messages::temporary_failure();
        }
    }
    match ledger.balance(user).await {
        Ok(amount) => messages::balance(amount),
        Err(e) if e.kind == LedgerErrorKind::NotFound => {
            messages::not_registered(&policy.support_contact)
        }
        Err(e) => {
            tracing::error!(user_id = user, error = %e, "Balance lookup failed");
            messages::temporary_failure()
        }
    }
}

async fn orders<L: Ledger + ?Sized>(ledger: &L, policy: &AccessPolicy, user: UserId) -> String {
    match policy.is_authorized(ledger, user).await {
        Ok(true) => {}
        Ok(false) => return messages::not_registered(&policy.support_contact),
        Err(e) => {
            tracing::error!(user_id = user, error = %e, "Authorization lookup failed");
            return messages::temporary_failure();
        }
    }
    match ledger.recent_orders(user, ORDER_HISTORY_LIMIT).await {
        Ok(orders) => messages::order_history(&orders),
        Err(e) => {
            tracing::error!(user_id = user, error = %e, "Order history lookup failed");
            messages::temporary_failure()
        }
    }
}

async fn add_user<L: Ledger + ?Sized>(ledger: &L, args: &str) -> String {
    let Some((target, amount)) = parse_user_amount(args) else {
        return messages::add_user_usage();
    };
    match ledger.add_user(target, &format!("User_{target}"), amount).await {
        Ok(()) => {
            tracing::info!(target_id = target, amount = %amount, "User added");
            messages::user_added(target, amount)
        }
        Err(e) if e.kind == LedgerErrorKind::Duplicate => messages::user_exists(target),
        Err(e) => {
            tracing::error!(target_id = target, error = %e, "Adding user failed");
            messages::user_add_failed(&e.message)
        }
    }
}

async fn top_up<L: Ledger + ?Sized>(ledger: &L, args: &str) -> String {
    let Some((target, amount)) = parse_user_amount(args) else {
        return messages::topup_usage();
    };
    match ledger.credit(target, amount).await {
        Ok(balance) => {
            tracing::info!(target_id = target, amount = %amount, balance = %balance, "Balance topped up");
            messages::topped_up(target, amount, balance)
        }
        Err(e) if e.kind == LedgerErrorKind::NotFound => messages::user_not_found(target),
        Err(e) => {
            tracing::error!(target_id = target, error = %e, "Top-up failed");
            messages::temporary_failure()
        }
    }
}

async fn set_balance<L: Ledger + ?Sized>(ledger: &L, args: &str) -> String {
    let Some((target, amount)) = parse_user_amount(args) else {
        return messages::set_balance_usage();
    };
    match ledger.set_balance(target, amount).await {
        Ok(()) => {
            tracing::info!(target_id = target, balance = %amount, "Balance set");
            messages::balance_set(target, amount)
        }
        Err(e) if e.kind == LedgerErrorKind::NotFound => messages::user_not_found(target),
        Err(e) => {
            tracing::error!(target_id = target, error = %e, "Setting balance failed");
            messages::temporary_failure()
        }
    }
}
