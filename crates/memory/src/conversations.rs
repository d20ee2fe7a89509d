//! In-process conversation store.
//!
//! Lists live in a map keyed by the policy key. Expiry is checked on access,
//! and `append` sweeps every expired conversation at most once per sweep
//! interval, so conversations that are never revisited do not pile up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragrelay_core::conversation::{ConversationStore, HistoryPolicy};
use ragrelay_core::error::StoreError;
use ragrelay_core::history::{HistoryItem, HistoryItems};
use ragrelay_core::message::ConversationId;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound between two sweeps of expired conversations.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    items: HistoryItems,
    expires_at: Instant,
}

struct Lists {
    entries: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Lists {
    fn sweep(&mut self, now: Instant, interval: Duration) {
        if now.duration_since(self.last_sweep) < interval {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        self.last_sweep = now;
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.entries.len(), "Swept expired conversations");
        }
    }
}

/// A conversation store that forgets everything on restart.
pub struct InMemoryConversationStore {
    policy: HistoryPolicy,
    lists: Arc<RwLock<Lists>>,
}

impl InMemoryConversationStore {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            policy,
            lists: Arc::new(RwLock::new(Lists {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    pub fn policy(&self) -> &HistoryPolicy {
        &self.policy
    }

    /// Conversations currently held, expired ones not yet swept included.
    pub async fn tracked(&self) -> usize {
        self.lists.read().await.entries.len()
    }

    fn sweep_interval(&self) -> Duration {
        self.policy.ttl.min(MAX_SWEEP_INTERVAL)
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(HistoryPolicy::default())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, id: &ConversationId, item: &HistoryItem) -> Result<usize, StoreError> {
        let key = self.policy.key_for(id);
        let now = Instant::now();
        let mut lists = self.lists.write().await;
        lists.sweep(now, self.sweep_interval());

        let entry = lists.entries.entry(key).or_insert_with(|| Entry {
            items: Vec::new(),
            expires_at: now,
        });
        if entry.expires_at <= now {
            entry.items.clear();
        }

        entry.items.push(item.clone());
        if entry.items.len() > self.policy.max_items {
            let excess = entry.items.len() - self.policy.max_items;
            entry.items.drain(..excess);
        }
        entry.expires_at = now + self.policy.ttl;

        debug!(conversation = %id, len = entry.items.len(), "Appended history item");
        Ok(entry.items.len())
    }

    async fn list(&self, id: &ConversationId) -> Result<HistoryItems, StoreError> {
        let key = self.policy.key_for(id);
        let now = Instant::now();

        {
            let lists = self.lists.read().await;
            match lists.entries.get(&key) {
                None => return Ok(Vec::new()),
                Some(entry) if entry.expires_at > now => return Ok(entry.items.clone()),
                Some(_) => {}
            }
        }

        // Expired: drop it so the map does not grow with dead conversations
        let mut lists = self.lists.write().await;
        if lists.entries.get(&key).is_some_and(|e| e.expires_at <= now) {
            lists.entries.remove(&key);
        }
        Ok(Vec::new())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), StoreError> {
        self.lists.write().await.entries.remove(&self.policy.key_for(id));
        Ok(())
    }
}
