//! The shared key-value store the engine keeps its canonical runtime in.
//!
//! The store is an external collaborator; the engine only sees this trait.
//! `MemoryKv` backs tests and single-node development, `SqliteKv` gives the
//! same semantics durability across restarts.

mod sqlite;

pub use sqlite::SqliteKv;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub type KvResult<T> = Result<T, KvError>;

#[derive(Debug)]
pub struct KvError(pub String);

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KV error: {}", self.0)
    }
}

impl std::error::Error for KvError {}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Writes `value`, refreshing the TTL. `ttl` of None means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()>;

    /// Set-if-absent with expiry; returns whether the key was taken.
    /// This is the primitive behind the hand-start lock.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> KvResult<bool>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    /// All live keys starting with `prefix` (used by boot recovery).
    async fn keys_with_prefix(&self, prefix: &str) -> KvResult<Vec<String>>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-process KV with TTL semantics, for tests and development.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> KvResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        if let Some(existing) = entries.get(key) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.entries
            .lock()
            .expect("kv mutex poisoned")
            .remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().expect("kv mutex poisoned");
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);
        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("1".to_string()));
        kv.delete("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let kv = MemoryKv::new();
        kv.set("a", "1", Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_contends() {
        let kv = MemoryKv::new();
        assert!(kv
            .set_nx("lock", "me", Duration::from_secs(5))
            .await
            .unwrap());
        assert!(!kv
            .set_nx("lock", "you", Duration::from_secs(5))
            .await
            .unwrap());
        assert_eq!(kv.get("lock").await.unwrap(), Some("me".to_string()));
    }

    #[tokio::test]
    async fn test_set_nx_wins_over_expired_lock() {
        let kv = MemoryKv::new();
        assert!(kv
            .set_nx("lock", "me", Duration::from_millis(0))
            .await
            .unwrap());
        assert!(kv
            .set_nx("lock", "you", Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_prefix_scan() {
        let kv = MemoryKv::new();
        kv.set("runtime:t1", "{}", None).await.unwrap();
        kv.set("runtime:t2", "{}", None).await.unwrap();
        kv.set("dealer:t1", "3", None).await.unwrap();

        let mut keys = kv.keys_with_prefix("runtime:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["runtime:t1", "runtime:t2"]);
    }
}
