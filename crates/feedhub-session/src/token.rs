//! One-time tokens exchanged for a WebSocket upgrade.
//!
//! A successful login issues a token bound to the caller's address. The
//! client presents it once on the upgrade request. Each token is consumed
//! exactly once: by a verification or by the expiry sweep, whichever
//! comes first.
//!
//! ```text
//! issue(addr) ──→ [live] ──verify(key)──→ consumed (upgrade allowed)
//!                   │
//!                   └──(retention elapsed)──→ [expired] ──sweep()──→ gone
//! ```
//!
//! Timestamps come from tokio's clock so expiry can be tested with paused
//! time.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{SessionError, TokenConfig};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// An issued one-time token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Address the token was issued to.
    pub address: IpAddr,
    /// The secret the client presents: 32 hex characters, 128 random bits.
    pub key: String,
    pub created: Instant,
}

/// Both indexes live behind one lock so they can never disagree.
#[derive(Debug, Default)]
struct TokenTable {
    by_key: HashMap<String, Token>,
    by_address: HashMap<IpAddr, String>,
}

impl TokenTable {
    fn insert(&mut self, token: Token) {
        self.by_address.insert(token.address, token.key.clone());
        self.by_key.insert(token.key.clone(), token);
    }

    fn remove(&mut self, key: &str) -> Option<Token> {
        let token = self.by_key.remove(key)?;
        if self.by_address.get(&token.address).is_some_and(|k| k == key) {
            self.by_address.remove(&token.address);
        }
        Some(token)
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Store of live one-time tokens, safe to share across tasks.
#[derive(Debug)]
pub struct TokenStore {
    table: Mutex<TokenTable>,
    config: TokenConfig,
}

impl TokenStore {
    /// Creates an empty store. Nothing is swept until
    /// [`spawn_sweeper`](Self::spawn_sweeper) is called.
    pub fn new(config: TokenConfig) -> Self {
        Self {
            table: Mutex::new(TokenTable::default()),
            config,
        }
    }

    /// Issues a fresh token for `address`.
    ///
    /// # Errors
    /// [`SessionError::TokenOutstanding`] if `address` already holds a
    /// token that has not expired. An expired one is discarded and
    /// replaced.
    pub fn issue(&self, address: IpAddr) -> Result<Token, SessionError> {
        let now = Instant::now();
        let mut table = self.table.lock();

        if let Some(existing) = table.by_address.get(&address).cloned() {
            let live = table
                .by_key
                .get(&existing)
                .is_some_and(|t| !self.is_expired(t, now));
            if live {
                return Err(SessionError::TokenOutstanding(address));
            }
            table.remove(&existing);
        }

        let mut key = generate_key();
        while table.by_key.contains_key(&key) {
            key = generate_key();
        }

        let token = Token {
            address,
            key,
            created: now,
        };
        table.insert(token.clone());
        tracing::debug!(%address, "one-time token issued");
        Ok(token)
    }

    /// Consumes `key`. Returns `true` only if it was issued and has not
    /// expired; the entry is removed either way, so a key never verifies
    /// twice.
    pub fn verify(&self, key: &str) -> bool {
        let now = Instant::now();
        let removed = self.table.lock().remove(key);
        match removed {
            Some(token) if !self.is_expired(&token, now) => {
                tracing::debug!(address = %token.address, "one-time token verified");
                true
            }
            Some(token) => {
                tracing::debug!(address = %token.address, "one-time token expired before use");
                false
            }
            None => false,
        }
    }

    /// Deletes every expired token. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut table = self.table.lock();
        let expired: Vec<String> = table
            .by_key
            .values()
            .filter(|t| self.is_expired(t, now))
            .map(|t| t.key.clone())
            .collect();
        for key in &expired {
            table.remove(key);
        }
        expired.len()
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval` until `shutdown`
    /// is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let every = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("token sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "expired one-time tokens swept");
                        }
                    }
                }
            }
        })
    }

    /// Number of stored tokens, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.table.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().by_key.is_empty()
    }

    fn is_expired(&self, token: &Token, now: Instant) -> bool {
        now.saturating_duration_since(token.created) > self.config.retention
    }
}

/// Generates a random 32-character hex string (128 bits of entropy) from
/// the thread-local CSPRNG.
fn generate_key() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn store() -> TokenStore {
        TokenStore::new(TokenConfig {
            retention: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
        })
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_returns_hex_key_bound_to_address() {
        let store = store();

        let token = store.issue(ip(1)).unwrap();

        assert_eq!(token.address, ip(1));
        assert_eq!(token.key.len(), 32);
        assert!(token.key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_distinct_addresses_get_distinct_keys() {
        let store = store();

        let a = store.issue(ip(1)).unwrap();
        let b = store.issue(ip(2)).unwrap();

        assert_ne!(a.key, b.key);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_while_outstanding_is_rejected() {
        let store = store();
        store.issue(ip(1)).unwrap();

        let result = store.issue(ip(1));

        assert!(matches!(result, Err(SessionError::TokenOutstanding(a)) if a == ip(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_is_single_use() {
        let store = store();
        let token = store.issue(ip(1)).unwrap();

        assert!(store.verify(&token.key));
        assert!(!store.verify(&token.key));
        assert!(!store.verify(&token.key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_unknown_key_has_no_side_effect() {
        let store = store();
        store.issue(ip(1)).unwrap();

        assert!(!store.verify("not-a-real-key"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_after_verify_succeeds() {
        let store = store();
        let first = store.issue(ip(1)).unwrap();
        store.verify(&first.key);

        let second = store.issue(ip(1)).expect("address is free again");
        assert_ne!(first.key, second.key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_after_expiry_succeeds_without_sweep() {
        let store = store();
        let first = store.issue(ip(1)).unwrap();

        time::advance(Duration::from_secs(6)).await;

        let second = store.issue(ip(1)).expect("expired token no longer blocks");
        assert_ne!(first.key, second.key);
        assert_eq!(store.len(), 1, "expired token was replaced");
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_expired_token_fails_and_consumes_it() {
        let store = store();
        let token = store.issue(ip(1)).unwrap();

        time::advance(Duration::from_secs(6)).await;

        assert!(!store.verify(&token.key));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let store = store();
        store.issue(ip(1)).unwrap();
        time::advance(Duration::from_secs(4)).await;
        let fresh = store.issue(ip(2)).unwrap();
        time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.verify(&fresh.key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_interval_and_stops_on_shutdown() {
        let store = Arc::new(store());
        store.issue(ip(1)).unwrap();
        let shutdown = CancellationToken::new();
        let handle = store.spawn_sweeper(shutdown.clone());

        // Token expires after 5s but the sweep only runs at 60s.
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 1);

        time::sleep(Duration::from_secs(31)).await;
        assert!(store.is_empty());

        shutdown.cancel();
        handle.await.expect("sweeper exits cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_issue_for_same_address_only_one_wins() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.issue(ip(7)).is_ok() }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
