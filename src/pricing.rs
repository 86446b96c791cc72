//! Quantity extraction and order pricing
//!
//! Quantities are read out of free-text food descriptions: every standalone
//! digit 1-9 counts as that many items. Longer digit runs ("10", "250g")
//! are not quantities and are skipped.

use rust_decimal::Decimal;

/// Price of a single item in ETB
pub const UNIT_PRICE: Decimal = Decimal::from_parts(665, 0, 0, false, 2);

/// Item count and price derived from a food description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub total_items: u32,
    pub total_price: Decimal,
}

impl Quote {
    pub fn for_items(total_items: u32) -> Self {
        Self {
            total_items,
            total_price: Decimal::from(total_items) * UNIT_PRICE,
        }
    }
}

/// Scan `text` for standalone digits 1-9 and price the total.
///
/// Returns `None` when the text holds no such digit.
pub fn parse_quantity(text: &str) -> Option<Quote> {
    let tokens = quantity_tokens(text);
    if tokens.is_empty() {
        return None;
    }
    Some(Quote::for_items(tokens.iter().sum()))
}

/// Every single-character digit run in `text`, in order of appearance
fn quantity_tokens(text: &str) -> Vec<u32> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 1 {
            if let Some(n) = chars[start].to_digit(10).filter(|n| *n > 0) {
                tokens.push(n);
            }
        }
    }

    tokens
}
