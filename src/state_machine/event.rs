//! Events that can occur in a conversation

use crate::db::OrderReceipt;
use rust_decimal::Decimal;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    /// `/start` from an authorized user
    Start,
    /// `/cancel`
    Cancel,
    /// Inline keyboard button pressed
    Button(ButtonToken),
    /// Free text that is not a command
    Text(String),

    // Ledger events
    OrderNumberAllocated {
        order_number: i64,
    },
    CommitSucceeded {
        receipt: OrderReceipt,
    },
    CommitDeclined {
        balance: Decimal,
    },
    LedgerFailed {
        message: String,
    },
}

impl Event {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Cancel => "cancel",
            Event::Button(_) => "button",
            Event::Text(_) => "text",
            Event::OrderNumberAllocated { .. } => "order_number_allocated",
            Event::CommitSucceeded { .. } => "commit_succeeded",
            Event::CommitDeclined { .. } => "commit_declined",
            Event::LedgerFailed { .. } => "ledger_failed",
        }
    }
}

/// Buttons the bot renders, encoded as Telegram callback data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonToken {
    ContractUser,
    SingleUser,
    /// Position in the configured cafe menu
    Cafe(usize),
    CustomCafe,
    OrderNow,
    ConfirmOrder,
    RestartOrder,
}

const CAFE_PREFIX: &str = "cafe:";

impl ButtonToken {
    /// Decode callback data; unknown payloads are rejected
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "contract_user" => Some(ButtonToken::ContractUser),
            "single_user" => Some(ButtonToken::SingleUser),
            "custom_cafe_input" => Some(ButtonToken::CustomCafe),
            "order_now" => Some(ButtonToken::OrderNow),
            "confirm_order" => Some(ButtonToken::ConfirmOrder),
            "restart_order" => Some(ButtonToken::RestartOrder),
            other => other
                .strip_prefix(CAFE_PREFIX)
                .and_then(|index| index.parse().ok())
                .map(ButtonToken::Cafe),
        }
    }

    pub fn callback_data(self) -> String {
        match self {
            ButtonToken::ContractUser => "contract_user".to_string(),
            ButtonToken::SingleUser => "single_user".to_string(),
            ButtonToken::Cafe(index) => format!("{CAFE_PREFIX}{index}"),
            ButtonToken::CustomCafe => "custom_cafe_input".to_string(),
            ButtonToken::OrderNow => "order_now".to_string(),
            ButtonToken::ConfirmOrder => "confirm_order".to_string(),
            ButtonToken::RestartOrder => "restart_order".to_string(),
        }
    }
}
