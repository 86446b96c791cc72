//! User-facing texts, keyboards and order formatting

use crate::db::{NewOrder, OrderReceipt, OrderSummary};
use crate::state_machine::event::ButtonToken;
use crate::state_machine::{Button, Keyboard, OrderDraft};
use rust_decimal::Decimal;

// ============================================================================
// Conversation Prompts
// ============================================================================

pub fn welcome() -> String {
    "👋 Welcome to Campus Delivery Bot!\n\
     ♥️ Thank you for choosing us.\n\
     🍕 Please pick your service type below."
        .to_string()
}

pub fn user_type_keyboard() -> Keyboard {
    Keyboard::default().row([
        Button::new("Contract user", ButtonToken::ContractUser),
        Button::new("Single order", ButtonToken::SingleUser),
    ])
}

pub fn single_user_coming_soon(contact: &str) -> String {
    format!(
        "✅ Single orders through the bot are coming soon!\n\
         ✅ Until then, order via {contact}."
    )
}

pub fn cafe_menu() -> String {
    "🍝 Please choose a cafe below!\n⬇️⬇️⬇️⬇️⬇️⬇️".to_string()
}

pub fn cafe_keyboard(cafes: &[String]) -> Keyboard {
    let keyboard = cafes.iter().enumerate().fold(Keyboard::default(), |kb, (i, name)| {
        kb.row([Button::new(name.clone(), ButtonToken::Cafe(i))])
    });
    keyboard.row([Button::new("Enter your cafe name", ButtonToken::CustomCafe)])
}

pub fn custom_cafe_prompt() -> String {
    "👩‍🍳 Type the name of the cafe you chose".to_string()
}

pub fn order_page(cafe: &str) -> String {
    format!(
        "🍝 {cafe}\n\n\
         🍕 When you are ready press \"Order now\" below and\n\
         answer the questions that follow, one at a time!"
    )
}

pub fn order_now_keyboard() -> Keyboard {
    Keyboard::default().row([Button::new("Order now", ButtonToken::OrderNow)])
}

pub fn name_prompt() -> String {
    "📄 Please enter your full name:".to_string()
}

pub fn gender_prompt() -> String {
    "🧒👧 Gender: send M for male or F for female".to_string()
}

pub fn gender_invalid() -> String {
    "❎ Please send only M or F".to_string()
}

pub fn phone_prompt() -> String {
    "☎️ Please enter your phone number:".to_string()
}

pub fn time_prompt() -> String {
    "⏰ Is this for lunch or dinner?".to_string()
}

pub fn food_prompt() -> String {
    "🍜 Please enter the food you chose and how many:".to_string()
}

pub fn food_invalid() -> String {
    "❎ Please include the quantity as a digit (1-9)\n\
     ✅ Example: 1 firfir and 1 atkilt"
        .to_string()
}

pub fn place_prompt() -> String {
    "🏢 Finally, enter your campus and dorm block in this form:\n\
     Main: Block number\n\
     Tecno: Block number\n\
     Agri: Block number"
        .to_string()
}

pub fn place_invalid() -> String {
    "🛡 Please enter your campus correctly,\n\
     making sure it includes Main, Agri or Tecno!"
        .to_string()
}

pub fn order_preview(draft: &OrderDraft) -> String {
    let total = draft.quote.map(|q| q.total_price).unwrap_or_default();
    format!(
        "Dear customer, here is the information you entered ⬇️\n\n\
         👩‍🍳 Cafe: {cafe}\n\
         📄 Name: {name}\n\
         🧒 Gender: {gender}\n\
         ☎️ Phone: {phone}\n\
         ⏰ Time: {time}\n\
         🍜 Food: {food}\n\
         🏢 Place: {place}\n\
         💰 Total: {total} ETB\n\
         📦 Order #: {number}",
        cafe = draft.cafe,
        name = draft.name.as_deref().unwrap_or_default(),
        gender = draft.gender.map(|g| g.code()).unwrap_or_default(),
        phone = draft.phone.as_deref().unwrap_or_default(),
        time = draft.requested_time.as_deref().unwrap_or_default(),
        food = draft.food_description.as_deref().unwrap_or_default(),
        place = draft.place.as_deref().unwrap_or_default(),
        total = money(total),
        number = draft.order_number,
    )
}

pub fn confirm_keyboard() -> Keyboard {
    Keyboard::default().row([
        Button::new("✅ Confirm", ButtonToken::ConfirmOrder),
        Button::new("Start over", ButtonToken::RestartOrder),
    ])
}

pub fn insufficient_funds(balance: Decimal, contact: &str) -> String {
    format!(
        "🛡 Your current balance ({} ETB) is not enough for this order!\n\
         🛡 Please check your balance and order again.\n\
         ✅ To top up, contact {contact}!",
        money(balance)
    )
}

pub fn order_success() -> String {
    "Your order was placed successfully ✅\n\
     Thank you for choosing Campus Delivery"
        .to_string()
}

pub fn order_cancelled() -> String {
    "Your order has been cancelled.".to_string()
}

pub fn temporary_failure() -> String {
    "⚠️ Something went wrong on our side. Please try again in a moment.".to_string()
}

// ============================================================================
// Channel Notice
// ============================================================================

/// Notice posted to the delivery channel after a successful commit
pub fn order_notice(order: &NewOrder, receipt: &OrderReceipt) -> String {
    format!(
        "📦 New order #{number}\n\n\
         👩‍🍳 Cafe: {cafe}\n\
         👤 Name: {name}\n\
         🧒 Gender: {gender}\n\
         ☎️ Phone: {phone}\n\
         ⏰ Time: {time}\n\
         🍜 Food: {food}\n\
         🏢 Place: {place}\n\
         💰 Total: {total} ETB\n\
         🔢 Quantity: {items} items\n\n\
         ⏱ Placed: {placed}",
        number = order.order_number,
        cafe = order.cafe,
        name = order.name,
        gender = order.gender.label(),
        phone = order.phone,
        time = order.requested_time,
        food = order.food,
        place = order.place,
        total = money(order.total_price),
        items = order.total_items,
        placed = receipt.created_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

// ============================================================================
// Commands
// ============================================================================

pub fn not_registered(contact: &str) -> String {
    format!(
        "❎ Please register before using this bot!\n\
         🧾 To register, contact {contact}."
    )
}

pub fn balance(amount: Decimal) -> String {
    format!("💰 Your current balance: {} ETB", money(amount))
}

pub fn admin_only() -> String {
    "❎ This command is for administrators only.".to_string()
}

pub fn add_user_usage() -> String {
    "❎ Invalid number.\n\n\
     Usage: /add_user <Telegram_ID> <Balance>\n\
     Example: /add_user 123456789 100"
        .to_string()
}

pub fn user_added(telegram_id: i64, amount: Decimal) -> String {
    format!("✅ User {telegram_id} added with {} ETB.", money(amount))
}

pub fn user_exists(telegram_id: i64) -> String {
    format!("❎ User {telegram_id} already exists.")
}

pub fn user_add_failed(reason: &str) -> String {
    format!("❎ Could not add the user.\nError: {reason}")
}

pub fn topup_usage() -> String {
    "❎ Invalid number.\n\n\
     Usage: /topup <Telegram_ID> <Amount>\n\
     Example: /topup 123456789 50"
        .to_string()
}

pub fn topped_up(telegram_id: i64, amount: Decimal, balance: Decimal) -> String {
    format!(
        "✅ Added {} ETB to user {telegram_id}. New balance: {} ETB",
        money(amount),
        money(balance)
    )
}

pub fn set_balance_usage() -> String {
    "❎ Invalid number.\n\n\
     Usage: /setbalance <Telegram_ID> <Balance>\n\
     Example: /setbalance 123456789 0"
        .to_string()
}

pub fn balance_set(telegram_id: i64, balance: Decimal) -> String {
    format!("✅ Balance of user {telegram_id} set to {} ETB.", money(balance))
}

pub fn user_not_found(telegram_id: i64) -> String {
    format!("❎ User {telegram_id} is not registered.")
}

pub fn order_history(orders: &[OrderSummary]) -> String {
    if orders.is_empty() {
        return "📦 You have no orders yet.".to_string();
    }
    let lines: Vec<String> = orders
        .iter()
        .map(|o| {
            format!(
                "#{} · {} · {} items · {} ETB · {}",
                o.order_number,
                o.cafe,
                o.total_items,
                money(o.total_price),
                o.created_at.format("%Y-%m-%d %H:%M"),
            )
        })
        .collect();
    format!("📦 Your recent orders:\n{}", lines.join("\n"))
}

/// Two-decimal rendering of an ETB amount
pub fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
