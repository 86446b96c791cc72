//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Button, Effect, Keyboard};
pub use event::{ButtonToken, Event};
pub use state::{
    ConvContext, ConvSettings, ConvState, Gender, OrderDraft, Outcome, Session, UserId, UserType,
};
pub use transition::{transition, TransitionError, TransitionResult};
