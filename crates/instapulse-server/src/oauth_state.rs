//! Pending OAuth CSRF states, held in memory with a fixed lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct OAuthStateStore {
    ttl: Duration,
    pending: Arc<Mutex<HashMap<String, Instant>>>,
}

impl OAuthStateStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Generates and remembers a fresh 32-hex-character state. Expired
    /// entries are purged on every call.
    pub async fn issue(&self) -> String {
        let state = random_state();
        let now = Instant::now();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, issued| now.duration_since(*issued) < self.ttl);
        pending.insert(state.clone(), now);
        state
    }

    /// Removes `state` and reports whether it was pending and unexpired.
    /// A state is accepted at most once.
    pub async fn consume(&self, state: &str) -> bool {
        let mut pending = self.pending.lock().await;
        pending
            .remove(state)
            .is_some_and(|issued| issued.elapsed() < self.ttl)
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// 128 random bits as 32 lowercase hex characters.
fn random_state() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_state_is_hex_and_single_use() {
        let store = OAuthStateStore::new(Duration::from_secs(600));
        let state = store.issue().await;

        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.consume(&state).await);
        assert!(!store.consume(&state).await);
    }

    #[tokio::test]
    async fn unknown_state_is_rejected() {
        let store = OAuthStateStore::new(Duration::from_secs(600));
        store.issue().await;
        assert!(!store.consume("deadbeef").await);
    }

    #[tokio::test]
    async fn expired_state_is_rejected_and_purged() {
        let store = OAuthStateStore::new(Duration::ZERO);
        let stale = store.issue().await;
        assert!(!store.consume(&stale).await);

        store.issue().await;
        store.issue().await;
        // Each issue purges everything older than the zero lifetime.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn states_are_distinct() {
        let store = OAuthStateStore::new(Duration::from_secs(600));
        assert_ne!(store.issue().await, store.issue().await);
    }
}
