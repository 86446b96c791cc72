//! Pure state transition function
//!
//! Every step of the ordering conversation is decided here. I/O (ledger,
//! chat, channels) is requested through effects and answered with events.

use super::state::{Gender, OrderDraft, Outcome, Session, UserType};
use super::{ButtonToken, ConvContext, ConvState, Effect, Event, Keyboard};
use crate::db::NewOrder;
use crate::messages;
use crate::pricing::parse_quantity;
use crate::routing::validate_place;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// Stale buttons, text while a button is expected, and the like
    #[error("No transition from {state} on {event}")]
    UnexpectedInput {
        state: &'static str,
        event: &'static str,
    },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same session, context and event it always produces the same
/// session and effects.
pub fn transition(
    session: &Session,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let contact = context.settings.support_contact.as_str();

    match (&session.state, event) {
        // ============================================================
        // Entry
        // ============================================================

        // Start always opens a fresh conversation
        (_, Event::Start) => {
            let fresh = Session {
                state: ConvState::AwaitingUserType,
                ..Session::new(context.user_id)
            };
            Ok(TransitionResult::new(fresh).with_effect(Effect::reply_with(
                messages::welcome(),
                messages::user_type_keyboard(),
            )))
        }

        (ConvState::AwaitingUserType, Event::Button(ButtonToken::ContractUser)) => {
            let next = Session {
                user_type: Some(UserType::Contract),
                state: ConvState::AwaitingCafeSelection,
                ..session.clone()
            };
            Ok(TransitionResult::new(next).with_effect(Effect::edit_with(
                messages::cafe_menu(),
                messages::cafe_keyboard(&context.settings.cafes),
            )))
        }

        // The single-user button also works from an old welcome message
        (
            ConvState::Idle | ConvState::AwaitingUserType,
            Event::Button(ButtonToken::SingleUser),
        ) => {
            let next = Session {
                user_type: Some(UserType::Single),
                ..ended(session, Outcome::SingleUserRedirect)
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::edit(messages::single_user_coming_soon(contact))))
        }

        // ============================================================
        // Cafe Selection
        // ============================================================
        (ConvState::AwaitingCafeSelection, Event::Button(ButtonToken::Cafe(index))) => {
            let Some(cafe) = context.cafe(index) else {
                return Err(TransitionError::InvalidTransition(format!(
                    "cafe index {index} out of range"
                )));
            };
            Ok(choose_cafe(session, cafe, Effect::edit_with))
        }

        (ConvState::AwaitingCafeSelection, Event::Button(ButtonToken::CustomCafe)) => {
            let next = Session {
                state: ConvState::AwaitingCustomCafeText,
                ..session.clone()
            };
            Ok(TransitionResult::new(next).with_effect(Effect::edit(messages::custom_cafe_prompt())))
        }

        (ConvState::AwaitingCustomCafeText, Event::Text(cafe)) => {
            Ok(choose_cafe(session, &cafe, Effect::reply_with))
        }

        // ============================================================
        // Order Number Allocation
        // ============================================================
        (ConvState::AwaitingOrderStart, Event::Button(ButtonToken::OrderNow)) => {
            let next = Session {
                state: ConvState::AllocatingOrderNumber,
                ..session.clone()
            };
            Ok(TransitionResult::new(next).with_effect(Effect::AllocateOrderNumber))
        }

        (ConvState::AllocatingOrderNumber, Event::OrderNumberAllocated { order_number }) => {
            let Some(cafe) = session.cafe.clone() else {
                return Err(TransitionError::InvalidTransition(
                    "order number allocated without a cafe".to_string(),
                ));
            };
            let next = Session {
                draft: Some(OrderDraft::open(cafe, order_number, context.user_id)),
                state: ConvState::AwaitingName,
                ..session.clone()
            };
            Ok(TransitionResult::new(next).with_effect(Effect::edit(messages::name_prompt())))
        }

        (ConvState::AllocatingOrderNumber, Event::LedgerFailed { .. }) => {
            let next = Session {
                state: ConvState::AwaitingOrderStart,
                ..session.clone()
            };
            Ok(TransitionResult::new(next).with_effect(Effect::reply_with(
                messages::temporary_failure(),
                messages::order_now_keyboard(),
            )))
        }

        // ============================================================
        // Order Fields
        // ============================================================
        (ConvState::AwaitingName, Event::Text(name)) => fill(
            session,
            ConvState::AwaitingGender,
            messages::gender_prompt(),
            |draft| draft.name = Some(name),
        ),

        (ConvState::AwaitingGender, Event::Text(text)) => match Gender::parse(&text) {
            Some(gender) => fill(
                session,
                ConvState::AwaitingPhone,
                messages::phone_prompt(),
                |draft| draft.gender = Some(gender),
            ),
            None => Ok(reprompt(session, messages::gender_invalid())),
        },

        (ConvState::AwaitingPhone, Event::Text(phone)) => fill(
            session,
            ConvState::AwaitingTime,
            messages::time_prompt(),
            |draft| draft.phone = Some(phone),
        ),

        (ConvState::AwaitingTime, Event::Text(time)) => fill(
            session,
            ConvState::AwaitingFood,
            messages::food_prompt(),
            |draft| draft.requested_time = Some(time),
        ),

        (ConvState::AwaitingFood, Event::Text(food)) => match parse_quantity(&food) {
            Some(quote) => fill(
                session,
                ConvState::AwaitingPlace,
                messages::place_prompt(),
                |draft| {
                    draft.food_description = Some(food);
                    draft.quote = Some(quote);
                },
            ),
            None => Ok(reprompt(session, messages::food_invalid())),
        },

        (ConvState::AwaitingPlace, Event::Text(place)) => {
            if !validate_place(&place) {
                return Ok(reprompt(session, messages::place_invalid()));
            }
            let mut next = session.clone();
            let draft = draft_mut(&mut next)?;
            draft.place = Some(place);
            let preview = messages::order_preview(draft);
            next.state = ConvState::AwaitingConfirmation;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::reply_with(preview, messages::confirm_keyboard())))
        }

        // ============================================================
        // Confirmation
        // ============================================================
        (ConvState::AwaitingConfirmation, Event::Button(ButtonToken::ConfirmOrder)) => {
            let order = complete_order(session)?;
            let next = Session {
                state: ConvState::Committing,
                ..session.clone()
            };
            Ok(TransitionResult::new(next).with_effect(Effect::CommitOrder { order }))
        }

        (ConvState::AwaitingConfirmation, Event::Button(ButtonToken::RestartOrder)) => {
            let mut next = session.clone();
            draft_mut(&mut next)?.restart();
            next.state = ConvState::AwaitingName;
            Ok(TransitionResult::new(next).with_effect(Effect::edit(messages::name_prompt())))
        }

        (ConvState::Committing, Event::CommitSucceeded { receipt }) => {
            let order = complete_order(session)?;
            let notify = Effect::Notify {
                destination: order.destination,
                text: messages::order_notice(&order, &receipt),
            };
            Ok(
                TransitionResult::new(ended(session, Outcome::Completed)).with_effects([
                    notify,
                    Effect::edit(messages::order_success()),
                ]),
            )
        }

        (ConvState::Committing, Event::CommitDeclined { balance }) => Ok(TransitionResult::new(
            ended(session, Outcome::InsufficientFunds),
        )
        .with_effect(Effect::edit(messages::insufficient_funds(balance, contact)))),

        // Nothing was written; the preview stays confirmable
        (ConvState::Committing, Event::LedgerFailed { .. }) => {
            let Some(draft) = session.draft.as_ref() else {
                return Err(missing_draft());
            };
            let text = format!(
                "{}\n\n{}",
                messages::temporary_failure(),
                messages::order_preview(draft)
            );
            let next = Session {
                state: ConvState::AwaitingConfirmation,
                ..session.clone()
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::reply_with(text, messages::confirm_keyboard())))
        }

        // ============================================================
        // Cancellation
        // ============================================================
        // Only a conversation in progress can be cancelled
        (state, Event::Cancel) if state.is_cancellable() => {
            Ok(TransitionResult::new(ended(session, Outcome::Cancelled))
                .with_effect(Effect::reply(messages::order_cancelled())))
        }

        (state, event) => Err(TransitionError::UnexpectedInput {
            state: state.name(),
            event: event.kind(),
        }),
    }
}

/// Store the cafe and show the order page
fn choose_cafe(
    session: &Session,
    cafe: &str,
    prompt: fn(String, Keyboard) -> Effect,
) -> TransitionResult {
    let next = Session {
        cafe: Some(cafe.to_string()),
        state: ConvState::AwaitingOrderStart,
        ..session.clone()
    };
    TransitionResult::new(next).with_effect(prompt(
        messages::order_page(cafe),
        messages::order_now_keyboard(),
    ))
}

/// Record one answered field and ask the next question
fn fill(
    session: &Session,
    next_state: ConvState,
    prompt: String,
    apply: impl FnOnce(&mut OrderDraft),
) -> Result<TransitionResult, TransitionError> {
    let mut next = session.clone();
    apply(draft_mut(&mut next)?);
    next.state = next_state;
    Ok(TransitionResult::new(next).with_effect(Effect::reply(prompt)))
}

/// Same state, same data, one error message
fn reprompt(session: &Session, text: String) -> TransitionResult {
    TransitionResult::new(session.clone()).with_effect(Effect::reply(text))
}

fn ended(session: &Session, outcome: Outcome) -> Session {
    Session {
        draft: None,
        state: ConvState::Ended { outcome },
        ..session.clone()
    }
}

fn draft_mut(session: &mut Session) -> Result<&mut OrderDraft, TransitionError> {
    session.draft.as_mut().ok_or_else(missing_draft)
}

fn complete_order(session: &Session) -> Result<NewOrder, TransitionError> {
    session
        .draft
        .as_ref()
        .and_then(OrderDraft::to_new_order)
        .ok_or_else(|| TransitionError::InvalidTransition("order draft incomplete".to_string()))
}

fn missing_draft() -> TransitionError {
    TransitionError::InvalidTransition("no order draft in progress".to_string())
}
