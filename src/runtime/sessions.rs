//! In-memory session store with idle expiry

use super::traits::SessionStore;
use crate::state_machine::{Session, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    session: Session,
    touched: Instant,
}

/// Sessions keyed by user id. Entries idle longer than `idle_timeout`
/// read as absent and are dropped by [`InMemorySessionStore::sweep_expired`].
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<UserId, Entry>>,
    idle_timeout: Duration,
}

impl InMemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Remove expired sessions, returning how many were dropped
    pub async fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let timeout = self.idle_timeout;
        entries.retain(|_, entry| entry.touched.elapsed() < timeout);
        before - entries.len()
    }

    /// Sweep on a fixed interval for the life of the process
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let dropped = store.sweep_expired().await;
                if dropped > 0 {
                    tracing::info!(dropped, "Expired idle sessions");
                }
            }
        })
    }

    #[allow(dead_code)] // Used in tests
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user: UserId) -> Result<Option<Session>, String> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&user)
            .filter(|entry| entry.touched.elapsed() < self.idle_timeout)
            .map(|entry| entry.session.clone()))
    }

    async fn put(&self, session: Session) -> Result<(), String> {
        let entry = Entry {
            session,
            touched: Instant::now(),
        };
        self.entries.write().await.insert(entry.session.user_id, entry);
        Ok(())
    }

    async fn delete(&self, user: UserId) -> Result<(), String> {
        self.entries.write().await.remove(&user);
        Ok(())
    }
}
