//! Conversation state types

use crate::db::NewOrder;
use crate::pricing::Quote;
use crate::routing;
use std::sync::Arc;

/// Telegram user id
pub type UserId = i64;

// ============================================================================
// Order Fields
// ============================================================================

/// Customer kind picked on the welcome screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    /// Prepaid contract customer, orders through the bot
    Contract,
    /// One-off customer, redirected to the support contact
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Accepts exactly `M` or `F`, in either case
    pub fn parse(input: &str) -> Option<Self> {
        match input.to_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

/// Order fields collected step by step.
///
/// `cafe`, `order_number` and `user_telegram_id` are fixed when the draft is
/// opened; the rest fill in one per step and are cleared together on restart.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub cafe: String,
    pub order_number: i64,
    pub user_telegram_id: UserId,
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub requested_time: Option<String>,
    pub food_description: Option<String>,
    pub quote: Option<Quote>,
    pub place: Option<String>,
}

impl OrderDraft {
    pub fn open(cafe: impl Into<String>, order_number: i64, user_telegram_id: UserId) -> Self {
        Self {
            cafe: cafe.into(),
            order_number,
            user_telegram_id,
            name: None,
            gender: None,
            phone: None,
            requested_time: None,
            food_description: None,
            quote: None,
            place: None,
        }
    }

    /// Drop everything collected after the cafe was chosen
    pub fn restart(&mut self) {
        *self = Self::open(
            std::mem::take(&mut self.cafe),
            self.order_number,
            self.user_telegram_id,
        );
    }

    /// The order record to commit, once every step has been answered
    pub fn to_new_order(&self) -> Option<NewOrder> {
        let gender = self.gender?;
        let quote = self.quote?;
        let place = self.place.clone()?;

        Some(NewOrder {
            order_number: self.order_number,
            cafe: self.cafe.clone(),
            name: self.name.clone()?,
            gender,
            phone: self.phone.clone()?,
            requested_time: self.requested_time.clone()?,
            food: self.food_description.clone()?,
            total_items: quote.total_items,
            total_price: quote.total_price,
            destination: routing::resolve(gender, &place),
            place,
            user_telegram_id: self.user_telegram_id,
        })
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// How a finished conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    InsufficientFunds,
    Cancelled,
    SingleUserRedirect,
}

/// Conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvState {
    /// No conversation in progress
    #[default]
    Idle,

    /// Welcome screen shown, waiting for contract/single choice
    AwaitingUserType,

    /// Cafe menu shown
    AwaitingCafeSelection,

    /// Waiting for a typed cafe name
    AwaitingCustomCafeText,

    /// Cafe chosen, waiting for "order now"
    AwaitingOrderStart,

    /// Order number requested from the ledger
    AllocatingOrderNumber,

    AwaitingName,
    AwaitingGender,
    AwaitingPhone,
    AwaitingTime,
    AwaitingFood,
    AwaitingPlace,

    /// Preview shown with confirm/restart buttons
    AwaitingConfirmation,

    /// Debit and order insert in flight
    Committing,

    /// Conversation finished; the session is discarded
    Ended { outcome: Outcome },
}

impl ConvState {
    /// True when no session needs to be kept for this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConvState::Idle | ConvState::Ended { .. })
    }

    /// States where the user is typing order fields or reviewing them
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ConvState::AwaitingName
                | ConvState::AwaitingGender
                | ConvState::AwaitingPhone
                | ConvState::AwaitingTime
                | ConvState::AwaitingFood
                | ConvState::AwaitingPlace
                | ConvState::AwaitingConfirmation
        )
    }

    /// States that accept `/cancel`
    pub fn is_cancellable(&self) -> bool {
        self.is_ordering()
            || matches!(
                self,
                ConvState::AwaitingUserType
                    | ConvState::AwaitingCafeSelection
                    | ConvState::AwaitingCustomCafeText
                    | ConvState::AwaitingOrderStart
            )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConvState::Idle => "idle",
            ConvState::AwaitingUserType => "awaiting_user_type",
            ConvState::AwaitingCafeSelection => "awaiting_cafe_selection",
            ConvState::AwaitingCustomCafeText => "awaiting_custom_cafe_text",
            ConvState::AwaitingOrderStart => "awaiting_order_start",
            ConvState::AllocatingOrderNumber => "allocating_order_number",
            ConvState::AwaitingName => "awaiting_name",
            ConvState::AwaitingGender => "awaiting_gender",
            ConvState::AwaitingPhone => "awaiting_phone",
            ConvState::AwaitingTime => "awaiting_time",
            ConvState::AwaitingFood => "awaiting_food",
            ConvState::AwaitingPlace => "awaiting_place",
            ConvState::AwaitingConfirmation => "awaiting_confirmation",
            ConvState::Committing => "committing",
            ConvState::Ended { .. } => "ended",
        }
    }
}

/// Per-user conversation data
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: UserId,
    pub user_type: Option<UserType>,
    pub cafe: Option<String>,
    pub draft: Option<OrderDraft>,
    pub state: ConvState,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            user_type: None,
            cafe: None,
            draft: None,
            state: ConvState::Idle,
        }
    }
}

/// Settings shared by every conversation (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvSettings {
    /// Vendors offered on the cafe menu, in display order
    pub cafes: Vec<String>,
    /// Who to contact for registration and top-ups
    pub support_contact: String,
}

/// Context for a conversation
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub user_id: UserId,
    pub settings: Arc<ConvSettings>,
}

impl ConvContext {
    pub fn new(user_id: UserId, settings: Arc<ConvSettings>) -> Self {
        Self { user_id, settings }
    }

    pub fn cafe(&self, index: usize) -> Option<&str> {
        self.settings.cafes.get(index).map(String::as_str)
    }
}
