//! Delivery routing
//!
//! Orders are posted to one of five delivery channels depending on the
//! campus area named in the delivery place and the customer's gender
//! (dorm blocks are split by gender on the main and tecno campuses).

use crate::state_machine::Gender;
use std::fmt;

/// Campus area keywords accepted in a delivery place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceKeyword {
    Main,
    Agri,
    Tecno,
}

impl PlaceKeyword {
    pub const ALL: [PlaceKeyword; 3] = [PlaceKeyword::Main, PlaceKeyword::Agri, PlaceKeyword::Tecno];

    pub fn as_str(self) -> &'static str {
        match self {
            PlaceKeyword::Main => "main",
            PlaceKeyword::Agri => "agri",
            PlaceKeyword::Tecno => "tecno",
        }
    }

    fn found_in(self, place_lower: &str) -> bool {
        place_lower.contains(self.as_str())
    }
}

/// Named delivery channel an order notice is posted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    FemaleMain,
    MaleMain,
    FemaleTecno,
    MaleTecno,
    Agri,
}

impl Destination {
    pub const ALL: [Destination; 5] = [
        Destination::FemaleMain,
        Destination::MaleMain,
        Destination::FemaleTecno,
        Destination::MaleTecno,
        Destination::Agri,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Destination::FemaleMain => "female_main",
            Destination::MaleMain => "male_main",
            Destination::FemaleTecno => "female_tecno",
            Destination::MaleTecno => "male_tecno",
            Destination::Agri => "agri",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A place is valid when it names one of the campus areas (case-insensitive)
pub fn validate_place(place: &str) -> bool {
    let lower = place.to_lowercase();
    PlaceKeyword::ALL.iter().any(|k| k.found_in(&lower))
}

/// Pick the delivery channel for an order.
///
/// Agri wins over the other keywords and ignores gender. Places without a
/// known keyword fall back to `male_main`; validated places never get there.
pub fn resolve(gender: Gender, place: &str) -> Destination {
    let lower = place.to_lowercase();

    if PlaceKeyword::Agri.found_in(&lower) {
        Destination::Agri
    } else if PlaceKeyword::Main.found_in(&lower) {
        match gender {
            Gender::Female => Destination::FemaleMain,
            Gender::Male => Destination::MaleMain,
        }
    } else if PlaceKeyword::Tecno.found_in(&lower) {
        match gender {
            Gender::Female => Destination::FemaleTecno,
            Gender::Male => Destination::MaleTecno,
        }
    } else {
        Destination::MaleMain
    }
}
