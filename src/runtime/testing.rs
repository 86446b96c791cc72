//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::db::{CommitOutcome, NewOrder, OrderReceipt, OrderSummary, FIRST_ORDER_NUMBER};
use crate::state_machine::{Keyboard, UserId};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// Mock Ledger
// ============================================================================

#[derive(Default)]
struct LedgerState {
    balances: HashMap<UserId, Decimal>,
    orders: Vec<NewOrder>,
    last_order_number: Option<i64>,
    balance_writes: usize,
    fail_allocations: usize,
    fail_commits: usize,
    fail_lookups: usize,
}

/// In-memory ledger with the same commit semantics as the database
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

#[allow(dead_code)]
impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, user: UserId, balance: Decimal) {
        self.state.lock().unwrap().balances.insert(user, balance);
    }

    pub fn balance_of(&self, user: UserId) -> Option<Decimal> {
        self.state.lock().unwrap().balances.get(&user).copied()
    }

    pub fn orders(&self) -> Vec<NewOrder> {
        self.state.lock().unwrap().orders.clone()
    }

    /// Number of successful balance mutations so far
    pub fn balance_writes(&self) -> usize {
        self.state.lock().unwrap().balance_writes
    }

    /// Make the next `n` order number requests fail
    pub fn fail_next_allocations(&self, n: usize) {
        self.state.lock().unwrap().fail_allocations = n;
    }

    /// Make the next `n` registration lookups fail
    pub fn fail_next_lookups(&self, n: usize) {
        self.state.lock().unwrap().fail_lookups = n;
    }

    /// Make the next `n` commits fail before touching anything
    pub fn fail_next_commits(&self, n: usize) {
        self.state.lock().unwrap().fail_commits = n;
    }
}

fn not_found(user: UserId) -> LedgerError {
    LedgerError::new(LedgerErrorKind::NotFound, format!("User not found: {user}"))
}

#[async_trait]
impl Ledger for MockLedger {
    async fn is_registered(&self, user: UserId) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_lookups > 0 {
            state.fail_lookups -= 1;
            return Err(LedgerError::unavailable("database is locked"));
        }
        Ok(state.balances.contains_key(&user))
    }

    async fn balance(&self, user: UserId) -> Result<Decimal, LedgerError> {
        self.balance_of(user).ok_or_else(|| not_found(user))
    }

    async fn set_balance(&self, user: UserId, amount: Decimal) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        let balance = state.balances.get_mut(&user).ok_or_else(|| not_found(user))?;
        *balance = amount;
        state.balance_writes += 1;
        Ok(())
    }

    async fn credit(&self, user: UserId, amount: Decimal) -> Result<Decimal, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let balance = state.balances.get_mut(&user).ok_or_else(|| not_found(user))?;
        *balance += amount;
        let new_balance = *balance;
        state.balance_writes += 1;
        Ok(new_balance)
    }

    async fn add_user(
        &self,
        user: UserId,
        _name: &str,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.balances.contains_key(&user) {
            return Err(LedgerError::new(
                LedgerErrorKind::Duplicate,
                format!("User already exists: {user}"),
            ));
        }
        state.balances.insert(user, initial_balance);
        Ok(())
    }

    async fn next_order_number(&self) -> Result<i64, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_allocations > 0 {
            state.fail_allocations -= 1;
            return Err(LedgerError::unavailable("database is locked"));
        }
        let next = state.last_order_number.map_or(FIRST_ORDER_NUMBER, |n| n + 1);
        state.last_order_number = Some(next);
        Ok(next)
    }

    async fn commit_order(&self, order: &NewOrder) -> Result<CommitOutcome, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(LedgerError::unavailable("disk I/O error"));
        }
        let balance = state
            .balances
            .get(&order.user_telegram_id)
            .copied()
            .unwrap_or_default();
        if balance < order.total_price {
            return Ok(CommitOutcome::InsufficientFunds { balance });
        }
        let balance_after = balance - order.total_price;
        state.balances.insert(order.user_telegram_id, balance_after);
        state.balance_writes += 1;
        state.orders.push(order.clone());
        Ok(CommitOutcome::Committed(OrderReceipt {
            created_at: Utc::now(),
            balance_after,
        }))
    }

    async fn recent_orders(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_telegram_id == user)
            .take(limit as usize)
            .map(|o| OrderSummary {
                order_number: o.order_number,
                cafe: o.cafe.clone(),
                total_items: o.total_items,
                total_price: o.total_price,
                destination: o.destination.to_string(),
                created_at: Utc::now(),
            })
            .collect())
    }
}

// ============================================================================
// Recording Transport
// ============================================================================

/// One outbound chat action
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Post {
        channel: ChannelRef,
        text: String,
    },
}

/// Transport that records everything and can fail posts to chosen channels
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Sent>>,
    /// Remaining failures per channel
    failures: Mutex<HashMap<ChannelRef, usize>>,
    /// Post attempts per channel, failed ones included
    attempts: Mutex<HashMap<ChannelRef, usize>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` posts to `channel`
    pub fn fail_posts_to(&self, channel: &ChannelRef, n: usize) {
        self.failures.lock().unwrap().insert(channel.clone(), n);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat_id: c, text, .. } | Sent::Edit { chat_id: c, text, .. }
                    if c == chat_id =>
                {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    pub fn last_text_to(&self, chat_id: i64) -> Option<String> {
        self.texts_to(chat_id).pop()
    }

    pub fn posts_to(&self, channel: &ChannelRef) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Post { channel: c, text } if &c == channel => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn attempts_to(&self, channel: &ChannelRef) -> usize {
        self.attempts.lock().unwrap().get(channel).copied().unwrap_or(0)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn post(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError> {
        *self.attempts.lock().unwrap().entry(channel.clone()).or_default() += 1;
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(channel) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::Request("chat not found".to_string()));
                }
            }
        }
        self.sent.lock().unwrap().push(Sent::Post {
            channel: channel.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        ConversationService, Inbound, InboundKind, InMemorySessionStore, RetryPolicy,
        RuntimeManager, ServiceSettings,
    };
    use super::*;
    use crate::commands::{AccessPolicy, Command};
    use crate::messages;
    use crate::routing::Destination;
    use crate::state_machine::{ButtonToken, ConvSettings, ConvState};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    const USER: UserId = 501;
    const ADMIN: UserId = 1;

    fn female_main_channel() -> ChannelRef {
        ChannelRef::Id(-1001)
    }

    fn agri_channel() -> ChannelRef {
        ChannelRef::Username("@agri_orders".into())
    }

    type TestService = ConversationService<MockLedger, InMemorySessionStore, RecordingTransport>;

    struct Harness {
        ledger: Arc<MockLedger>,
        sessions: Arc<InMemorySessionStore>,
        transport: Arc<RecordingTransport>,
        service: Arc<TestService>,
        next_message_id: i32,
    }

    impl Harness {
        fn new() -> Self {
            let ledger = Arc::new(MockLedger::new());
            let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(3600)));
            let transport = Arc::new(RecordingTransport::new());
            let settings = ServiceSettings {
                conversation: Arc::new(ConvSettings {
                    cafes: vec!["Shewit".into(), "Mesi".into()],
                    support_contact: "@support".into(),
                }),
                access: AccessPolicy {
                    admins: HashSet::from([ADMIN]),
                    support_contact: "@support".into(),
                },
                // male_main and the tecno channels are left unconfigured
                channels: HashMap::from([
                    (Destination::FemaleMain, female_main_channel()),
                    (Destination::Agri, agri_channel()),
                ]),
                notify_retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                },
            };
            let service = Arc::new(ConversationService::new(
                settings,
                Arc::clone(&ledger),
                Arc::clone(&sessions),
                Arc::clone(&transport),
            ));
            Self {
                ledger,
                sessions,
                transport,
                service,
                next_message_id: 10,
            }
        }

        async fn command(&self, command: Command) {
            self.service
                .handle(Inbound {
                    user_id: USER,
                    chat_id: USER,
                    kind: InboundKind::Command(command),
                })
                .await;
        }

        async fn text(&self, text: &str) {
            self.service
                .handle(Inbound {
                    user_id: USER,
                    chat_id: USER,
                    kind: InboundKind::Text(text.to_string()),
                })
                .await;
        }

        async fn press(&mut self, token: ButtonToken) {
            self.next_message_id += 1;
            self.service
                .handle(Inbound {
                    user_id: USER,
                    chat_id: USER,
                    kind: InboundKind::Button {
                        token,
                        message_id: Some(self.next_message_id),
                    },
                })
                .await;
        }

        async fn state(&self) -> Option<ConvState> {
            self.sessions.get(USER).await.unwrap().map(|s| s.state)
        }

        /// Walk the whole form up to the confirmation screen
        async fn fill_order(&mut self, gender: &str, place: &str) {
            self.command(Command::Start).await;
            self.press(ButtonToken::ContractUser).await;
            self.press(ButtonToken::Cafe(0)).await;
            self.press(ButtonToken::OrderNow).await;
            for answer in ["Hana Tesfaye", gender, "0911000000", "lunch", "2 burgers and 1 soda", place] {
                self.text(answer).await;
            }
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_unregistered_user_cannot_start() {
        let h = Harness::new();
        h.command(Command::Start).await;

        assert_eq!(
            h.transport.last_text_to(USER),
            Some(messages::not_registered("@support"))
        );
        assert_eq!(h.state().await, None);
    }

    #[tokio::test]
    async fn test_start_during_ledger_outage_reports_failure() {
        let h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.ledger.fail_next_lookups(1);
        h.command(Command::Start).await;

        assert_eq!(h.transport.last_text_to(USER), Some(messages::temporary_failure()));
        assert_eq!(h.state().await, None);

        h.command(Command::Start).await;
        assert_eq!(h.transport.last_text_to(USER), Some(messages::welcome()));
    }

    #[tokio::test]
    async fn test_admin_can_start_without_registration() {
        let h = Harness::new();
        h.service
            .handle(Inbound {
                user_id: ADMIN,
                chat_id: ADMIN,
                kind: InboundKind::Command(Command::Start),
            })
            .await;
        assert_eq!(h.transport.last_text_to(ADMIN), Some(messages::welcome()));
    }

    #[tokio::test]
    async fn test_successful_order_debits_once_and_notifies() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.fill_order("F", "Main Block 4").await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingConfirmation));

        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;

        assert_eq!(h.state().await, None);
        assert_eq!(h.ledger.balance_of(USER), Some(dec("80.05")));
        assert_eq!(h.ledger.balance_writes(), 1);

        let orders = h.ledger.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_number, 1000);
        assert_eq!(orders[0].cafe, "Shewit");
        assert_eq!(orders[0].destination, Destination::FemaleMain);

        let notices = h.transport.posts_to(&female_main_channel());
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("#1000"));
        assert!(notices[0].contains("19.95 ETB"));
        assert_eq!(h.transport.last_text_to(USER), Some(messages::order_success()));
    }

    #[tokio::test]
    async fn test_insufficient_balance_changes_nothing() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("10"));
        h.fill_order("F", "Main Block 4").await;
        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;

        assert_eq!(h.state().await, None);
        assert_eq!(h.ledger.balance_of(USER), Some(dec("10")));
        assert_eq!(h.ledger.balance_writes(), 0);
        assert!(h.ledger.orders().is_empty());
        assert!(h.transport.posts_to(&female_main_channel()).is_empty());
        assert_eq!(
            h.transport.last_text_to(USER),
            Some(messages::insufficient_funds(dec("10"), "@support"))
        );
    }

    #[tokio::test]
    async fn test_invalid_answers_reprompt() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.command(Command::Start).await;
        h.press(ButtonToken::ContractUser).await;
        h.press(ButtonToken::CustomCafe).await;
        h.text("Abyssinia Kitchen").await;
        h.press(ButtonToken::OrderNow).await;
        h.text("Hana").await;

        h.text("woman").await;
        assert_eq!(h.transport.last_text_to(USER), Some(messages::gender_invalid()));
        assert_eq!(h.state().await, Some(ConvState::AwaitingGender));

        h.text("f").await;
        h.text("0911000000").await;
        h.text("dinner").await;
        h.text("some injera").await;
        assert_eq!(h.transport.last_text_to(USER), Some(messages::food_invalid()));

        h.text("3 injera").await;
        h.text("hostel 9").await;
        assert_eq!(h.transport.last_text_to(USER), Some(messages::place_invalid()));
        assert_eq!(h.state().await, Some(ConvState::AwaitingPlace));

        h.text("Agri block 2").await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingConfirmation));
        let preview = h.transport.last_text_to(USER).unwrap();
        assert!(preview.contains("Abyssinia Kitchen"));
        assert!(preview.contains("19.95 ETB"));
    }

    #[tokio::test]
    async fn test_cancel_mid_flow_leaves_ledger_untouched() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.command(Command::Start).await;
        h.press(ButtonToken::ContractUser).await;
        h.press(ButtonToken::Cafe(1)).await;
        h.press(ButtonToken::OrderNow).await;
        h.text("Hana").await;

        h.command(Command::Cancel).await;
        assert_eq!(h.state().await, None);
        assert_eq!(h.transport.last_text_to(USER), Some(messages::order_cancelled()));
        assert_eq!(h.ledger.balance_writes(), 0);

        // Neither text nor another /cancel gets a reply once it is over
        h.transport.clear();
        h.text("M").await;
        h.command(Command::Cancel).await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_restart_then_confirm_uses_same_number() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.fill_order("M", "Tecno 12").await;

        h.press(ButtonToken::RestartOrder).await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingName));
        for answer in ["Abel", "F", "0922000000", "dinner", "1 pasta", "Agri 3"] {
            h.text(answer).await;
        }
        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;

        let orders = h.ledger.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_number, 1000);
        assert_eq!(orders[0].name, "Abel");
        assert_eq!(orders[0].total_items, 1);
        assert_eq!(h.transport.posts_to(&agri_channel()).len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_skips_notice() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.fill_order("M", "Main Block 1").await;
        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;

        // male_main has no channel; the order still stands
        assert_eq!(h.ledger.orders().len(), 1);
        assert_eq!(h.transport.last_text_to(USER), Some(messages::order_success()));
    }

    #[tokio::test]
    async fn test_notice_retried_after_failures() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.transport.fail_posts_to(&female_main_channel(), 2);
        h.fill_order("F", "main 4").await;
        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;

        assert_eq!(h.transport.attempts_to(&female_main_channel()), 3);
        assert_eq!(h.transport.posts_to(&female_main_channel()).len(), 1);
        assert_eq!(h.ledger.balance_writes(), 1);
    }

    #[tokio::test]
    async fn test_notice_gives_up_without_touching_ledger() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.transport.fail_posts_to(&female_main_channel(), 10);
        h.fill_order("F", "main 4").await;
        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;

        assert_eq!(h.transport.attempts_to(&female_main_channel()), 3);
        assert!(h.transport.posts_to(&female_main_channel()).is_empty());
        assert_eq!(h.ledger.orders().len(), 1);
        assert_eq!(h.ledger.balance_of(USER), Some(dec("80.05")));
    }

    #[tokio::test]
    async fn test_allocation_failure_allows_retry() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.ledger.fail_next_allocations(1);
        h.command(Command::Start).await;
        h.press(ButtonToken::ContractUser).await;
        h.press(ButtonToken::Cafe(0)).await;
        h.press(ButtonToken::OrderNow).await;

        assert_eq!(h.state().await, Some(ConvState::AwaitingOrderStart));
        assert_eq!(h.transport.last_text_to(USER), Some(messages::temporary_failure()));

        h.press(ButtonToken::OrderNow).await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingName));
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_order_confirmable() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.ledger.fail_next_commits(1);
        h.fill_order("F", "Main Block 4").await;

        h.press(ButtonToken::ConfirmOrder).await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingConfirmation));
        assert_eq!(h.ledger.balance_writes(), 0);

        h.press(ButtonToken::ConfirmOrder).await;
        h.service.drain_notifications().await;
        assert_eq!(h.ledger.orders().len(), 1);
        assert_eq!(h.state().await, None);
    }

    #[tokio::test]
    async fn test_button_press_edits_its_message() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.command(Command::Start).await;
        h.press(ButtonToken::ContractUser).await;

        let sent = h.transport.sent();
        assert!(matches!(
            sent.last(),
            Some(Sent::Edit { message_id: 11, keyboard: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_single_user_redirected() {
        let mut h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        h.command(Command::Start).await;
        h.press(ButtonToken::SingleUser).await;

        assert_eq!(h.state().await, None);
        assert_eq!(
            h.transport.last_text_to(USER),
            Some(messages::single_user_coming_soon("@support"))
        );
    }

    #[tokio::test]
    async fn test_balance_command_through_service() {
        let h = Harness::new();
        h.ledger.add_customer(USER, dec("42"));
        h.command(Command::Balance).await;
        assert_eq!(h.transport.last_text_to(USER), Some(messages::balance(dec("42"))));
    }

    #[tokio::test]
    async fn test_manager_orders_updates_per_user() {
        let h = Harness::new();
        h.ledger.add_customer(USER, dec("100"));
        let manager = RuntimeManager::new(Arc::clone(&h.service), Duration::from_millis(50));

        let updates = [
            InboundKind::Command(Command::Start),
            InboundKind::Button {
                token: ButtonToken::ContractUser,
                message_id: Some(1),
            },
            InboundKind::Button {
                token: ButtonToken::Cafe(0),
                message_id: Some(1),
            },
            InboundKind::Button {
                token: ButtonToken::OrderNow,
                message_id: Some(1),
            },
            InboundKind::Text("Hana".into()),
        ];
        for kind in updates {
            manager
                .dispatch(Inbound {
                    user_id: USER,
                    chat_id: USER,
                    kind,
                })
                .await;
        }
        assert_eq!(manager.active_workers().await, 1);

        // Worker drains its queue, then retires once idle
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingGender));
        assert_eq!(manager.active_workers().await, 0);

        // A new update respawns the worker and continues the same session
        manager
            .dispatch(Inbound {
                user_id: USER,
                chat_id: USER,
                kind: InboundKind::Text("F".into()),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.state().await, Some(ConvState::AwaitingPhone));
    }
}
