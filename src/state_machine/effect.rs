//! Effects produced by state transitions

use crate::db::NewOrder;
use crate::routing::Destination;
use crate::state_machine::event::ButtonToken;

/// A labeled inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: ButtonToken,
}

impl Button {
    pub fn new(label: impl Into<String>, token: ButtonToken) -> Self {
        Self {
            label: label.into(),
            token,
        }
    }
}

/// Inline keyboard, one inner vec per row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        self.rows.push(buttons.into_iter().collect());
        self
    }
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a new message to the user
    Reply {
        text: String,
        keyboard: Option<Keyboard>,
    },

    /// Replace the message whose button was pressed
    EditPrompt {
        text: String,
        keyboard: Option<Keyboard>,
    },

    /// Reserve the next order number
    AllocateOrderNumber,

    /// Debit the balance and store the order in one ledger transaction
    CommitOrder { order: NewOrder },

    /// Post an order notice to a delivery channel
    Notify {
        destination: Destination,
        text: String,
    },
}

impl Effect {
    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn reply_with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Effect::Reply {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    pub fn edit(text: impl Into<String>) -> Self {
        Effect::EditPrompt {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn edit_with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Effect::EditPrompt {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Text shown to the user, if this effect talks to them
    #[allow(dead_code)] // Used in tests
    pub fn user_text(&self) -> Option<&str> {
        match self {
            Effect::Reply { text, .. } | Effect::EditPrompt { text, .. } => Some(text),
            _ => None,
        }
    }
}
