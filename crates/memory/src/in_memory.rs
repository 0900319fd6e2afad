//! In-memory history — useful for testing and ephemeral chats.

use async_trait::async_trait;
use chrono::Utc;
use relaymind_core::error::HistoryError;
use relaymind_core::history::HistoryStore;
use relaymind_core::message::{Role, Turn, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    next_id: i64,
    logs: HashMap<UserId, Vec<Turn>>,
}

/// A history store that keeps every user's log in a `HashMap`.
/// Nothing survives the process.
#[derive(Default)]
pub struct InMemoryHistory {
    state: RwLock<State>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    fn name(&self) -> &str { "in_memory" }

    async fn append(&self, user_id: UserId, role: Role, content: &str) -> Result<Turn, HistoryError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;

        let log = state.logs.entry(user_id).or_default();
        let mut timestamp = Utc::now();
        if let Some(last) = log.last() {
            timestamp = timestamp.max(last.timestamp);
        }

        let turn = Turn {
            id: Some(id),
            user_id,
            role,
            content: content.to_string(),
            timestamp,
        };
        log.push(turn.clone());
        Ok(turn)
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<Turn>, HistoryError> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .get(&user_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), HistoryError> {
        self.state.write().await.logs.remove(&user_id);
        Ok(())
    }

    async fn count(&self, user_id: UserId) -> Result<usize, HistoryError> {
        Ok(self.state.read().await.logs.get(&user_id).map_or(0, Vec::len))
    }
}
