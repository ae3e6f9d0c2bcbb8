//! Typed access to the engine's KV layout.
//!
//! Keys, TTLs, and serialization all live here so the engine proper never
//! touches a raw key string. Every call retries one transient failure
//! before giving up.

use crate::config::{HAND_START_LOCK_SECS, PUBLIC_STATE_TTL_SECS, RUNTIME_TTL_SECS};
use crate::game::deck::Card;
use crate::game::runtime::TableRuntime;
use crate::kv::{KvResult, KvStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RuntimeStore {
    kv: Arc<dyn KvStore>,
}

#[derive(Debug)]
pub enum StoreError {
    Kv(String),
    Corrupt(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Kv(msg) => write!(f, "KV failure: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "Corrupt blob: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

fn runtime_key(table_id: &str) -> String {
    format!("runtime:{}", table_id)
}

fn hole_cards_key(table_id: &str, hand_id: &str, user_id: &str) -> String {
    format!("hand:{}:{}:{}", table_id, hand_id, user_id)
}

fn dealer_key(table_id: &str) -> String {
    format!("dealer:{}", table_id)
}

fn hand_start_lock_key(table_id: &str) -> String {
    format!("hand_start_lock:{}", table_id)
}

fn public_state_key(table_id: &str) -> String {
    format!("public_state:{}", table_id)
}

/// Retry a KV call once on failure; transient blips should not fail an
/// action that can succeed on the second attempt.
async fn retry_once<T, F, Fut>(mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = KvResult<T>>,
{
    match op().await {
        Ok(v) => Ok(v),
        Err(first) => {
            tracing::warn!("KV call failed, retrying once: {}", first);
            op().await.map_err(|e| StoreError::Kv(e.to_string()))
        }
    }
}

impl RuntimeStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn load_runtime(&self, table_id: &str) -> StoreResult<Option<TableRuntime>> {
        let key = runtime_key(table_id);
        let raw = retry_once(|| self.kv.get(&key)).await?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("runtime {}: {}", table_id, e))),
            None => Ok(None),
        }
    }

    /// Writes the runtime blob back, refreshing its TTL.
    pub async fn save_runtime(&self, table_id: &str, runtime: &TableRuntime) -> StoreResult<()> {
        let key = runtime_key(table_id);
        let json = serde_json::to_string(runtime)
            .map_err(|e| StoreError::Corrupt(format!("runtime {}: {}", table_id, e)))?;
        retry_once(|| {
            self.kv
                .set(&key, &json, Some(Duration::from_secs(RUNTIME_TTL_SECS)))
        })
        .await
    }

    pub async fn delete_runtime(&self, table_id: &str) -> StoreResult<()> {
        let key = runtime_key(table_id);
        retry_once(|| self.kv.delete(&key)).await
    }

    /// Table ids with a live runtime blob; drives boot recovery.
    pub async fn running_table_ids(&self) -> StoreResult<Vec<String>> {
        let keys = retry_once(|| self.kv.keys_with_prefix("runtime:")).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("runtime:").map(str::to_string))
            .collect())
    }

    /// Hole cards are keyed per user so the showdown resolver can address
    /// them while the public blob stays clean.
    pub async fn save_hole_cards(
        &self,
        table_id: &str,
        hand_id: &str,
        user_id: &str,
        cards: &[Card; 2],
    ) -> StoreResult<()> {
        let key = hole_cards_key(table_id, hand_id, user_id);
        let json = serde_json::to_string(cards)
            .map_err(|e| StoreError::Corrupt(format!("hole cards: {}", e)))?;
        retry_once(|| {
            self.kv
                .set(&key, &json, Some(Duration::from_secs(RUNTIME_TTL_SECS)))
        })
        .await
    }

    pub async fn load_hole_cards(
        &self,
        table_id: &str,
        hand_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<[Card; 2]>> {
        let key = hole_cards_key(table_id, hand_id, user_id);
        let raw = retry_once(|| self.kv.get(&key)).await?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("hole cards: {}", e))),
            None => Ok(None),
        }
    }

    pub async fn load_dealer(&self, table_id: &str) -> StoreResult<Option<usize>> {
        let key = dealer_key(table_id);
        let raw = retry_once(|| self.kv.get(&key)).await?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    pub async fn save_dealer(&self, table_id: &str, seat_no: usize) -> StoreResult<()> {
        let key = dealer_key(table_id);
        let value = seat_no.to_string();
        retry_once(|| self.kv.set(&key, &value, None)).await
    }

    /// Short-expiry set-if-absent lock around hand construction. Contention
    /// means another starter won; the caller reports "not started".
    pub async fn try_lock_hand_start(&self, table_id: &str) -> StoreResult<bool> {
        let key = hand_start_lock_key(table_id);
        retry_once(|| {
            self.kv
                .set_nx(&key, "1", Duration::from_secs(HAND_START_LOCK_SECS))
        })
        .await
    }

    pub async fn unlock_hand_start(&self, table_id: &str) -> StoreResult<()> {
        let key = hand_start_lock_key(table_id);
        retry_once(|| self.kv.delete(&key)).await
    }

    /// Best-effort snapshot cache; failures are logged and swallowed
    /// because a stale cache must never block a hand.
    pub async fn cache_public_state(&self, table_id: &str, snapshot_json: &str) {
        let key = public_state_key(table_id);
        let result = self
            .kv
            .set(
                &key,
                snapshot_json,
                Some(Duration::from_secs(PUBLIC_STATE_TTL_SECS)),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!("Failed to cache public state for {}: {}", table_id, e);
        }
    }
}
