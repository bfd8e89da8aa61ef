//! Per-address nonce allocation with a JSON-backed cache
//!
//! The first request for an address seeds the cache from the chain's pending
//! transaction count. After that, allocation is local: the cached value is
//! handed out and incremented without another round-trip. The whole
//! read-modify-persist sequence (including the seed query) runs under one
//! async mutex, which is what keeps two concurrent callers from ever receiving
//! the same nonce.
//!
//! The cache maps lowercase address -> next free nonce and is rewritten
//! atomically on every mutation. Drift against the chain is detected on
//! request (`check_drift`) and only ever corrected by an explicit
//! `set_nonce` / `reset_nonce`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chain::{normalize_address, ChainClient};
use crate::config::NonceConfig;
use crate::errors::NonceError;
use crate::journal::Journal;
use crate::logger::{self, LogTag};
use crate::paths;

type NonceMap = BTreeMap<String, u64>;

/// One line of the nonce journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceEvent {
    pub tx_id: String,
    pub address: String,
    pub on_chain_nonce: Option<u64>,
    pub local_nonce: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

pub struct NonceManager {
    chain: Arc<dyn ChainClient>,
    cache_path: PathBuf,
    journal: Journal,
    nonces: Mutex<NonceMap>,
}

impl NonceManager {
    pub fn new(chain: Arc<dyn ChainClient>, cache_path: PathBuf, log_path: PathBuf) -> Self {
        let nonces = load_cache(&cache_path);
        logger::debug(
            LogTag::Nonce,
            &format!(
                "Nonce cache {} loaded with {} addresses",
                cache_path.display(),
                nonces.len()
            ),
        );

        Self {
            chain,
            cache_path,
            journal: Journal::new(log_path),
            nonces: Mutex::new(nonces),
        }
    }

    pub fn from_config(chain: Arc<dyn ChainClient>, config: &NonceConfig) -> Self {
        Self::new(
            chain,
            paths::resolve(&config.cache_file),
            paths::resolve(&config.log_file),
        )
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Allocate the next nonce for `address`
    pub async fn get_nonce(&self, address: &str) -> Result<u64, NonceError> {
        self.get_nonce_for(address, "").await
    }

    /// Allocate the next nonce, tagging the journal entry with `tx_id`
    pub async fn get_nonce_for(&self, address: &str, tx_id: &str) -> Result<u64, NonceError> {
        let key = normalize_address(address);
        let mut nonces = self.nonces.lock().await;

        let (nonce, on_chain) = match nonces.get(&key) {
            Some(&next) => (next, None),
            None => {
                let count = self
                    .chain
                    .transaction_count(&key)
                    .await
                    .map_err(|source| NonceError::Chain {
                        address: key.clone(),
                        source,
                    })?;
                logger::info(
                    LogTag::Nonce,
                    &format!("Seeded nonce for {} from chain: {}", key, count),
                );
                (count, Some(count))
            }
        };

        // Persist before handing the value out: a nonce that was never
        // recorded must not be used
        let next = nonce
            .checked_add(1)
            .ok_or_else(|| NonceError::Exhausted { address: key.clone() })?;
        let mut updated = nonces.clone();
        updated.insert(key.clone(), next);
        self.persist(&updated)?;
        *nonces = updated;

        self.log_event("get", &key, on_chain, Some(nonce), tx_id);
        logger::debug(LogTag::Nonce, &format!("Allocated nonce {} for {}", nonce, key));
        Ok(nonce)
    }

    /// Manually set the next nonce for `address`
    pub async fn set_nonce(&self, address: &str, value: u64) -> Result<(), NonceError> {
        let key = normalize_address(address);
        let mut nonces = self.nonces.lock().await;

        let mut updated = nonces.clone();
        let previous = updated.insert(key.clone(), value);
        self.persist(&updated)?;
        *nonces = updated;

        logger::warning(
            LogTag::Nonce,
            &format!(
                "Nonce for {} manually set to {} (was {:?})",
                key, value, previous
            ),
        );
        self.log_event("update", &key, None, Some(value), "");
        Ok(())
    }

    /// Forget `address` so the next allocation re-seeds from the chain
    pub async fn reset_nonce(&self, address: &str) -> Result<(), NonceError> {
        let key = normalize_address(address);
        let mut nonces = self.nonces.lock().await;

        let mut updated = nonces.clone();
        updated.remove(&key);
        self.persist(&updated)?;
        *nonces = updated;

        logger::warning(LogTag::Nonce, &format!("Nonce cache reset for {}", key));
        self.log_event("reset", &key, None, None, "");
        Ok(())
    }

    /// Next nonce that would be handed out, if the address is cached
    pub async fn peek(&self, address: &str) -> Option<u64> {
        self.nonces.lock().await.get(&normalize_address(address)).copied()
    }

    /// Compare the cache with the chain without changing either
    ///
    /// The chain being ahead of the cache means a transaction was sent from
    /// outside this manager. The operator must resolve it with `set_nonce`.
    pub async fn check_drift(&self, address: &str) -> Result<(), NonceError> {
        let key = normalize_address(address);
        let nonces = self.nonces.lock().await;
        let Some(&cached) = nonces.get(&key) else {
            return Ok(());
        };

        let on_chain = self
            .chain
            .transaction_count(&key)
            .await
            .map_err(|source| NonceError::Chain {
                address: key.clone(),
                source,
            })?;
        self.log_event("drift_check", &key, Some(on_chain), Some(cached), "");

        if on_chain > cached {
            logger::error(
                LogTag::Nonce,
                &format!(
                    "Nonce drift for {}: cache next={} chain={}; manual reset required",
                    key, cached, on_chain
                ),
            );
            return Err(NonceError::DriftDetected {
                address: key,
                cached,
                on_chain,
            });
        }
        Ok(())
    }

    /// Write the current cache to `path` for DRP export
    pub async fn snapshot(&self, path: &Path) -> Result<(), NonceError> {
        let nonces = self.nonces.lock().await;
        write_atomic(path, &nonces)?;
        logger::info(
            LogTag::Nonce,
            &format!("Nonce snapshot written to {} ({} addresses)", path.display(), nonces.len()),
        );
        Ok(())
    }

    /// Replace the cache with a snapshot taken by [`NonceManager::snapshot`]
    pub async fn restore(&self, path: &Path) -> Result<(), NonceError> {
        let contents = std::fs::read_to_string(path).map_err(|source| NonceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let restored: NonceMap =
            serde_json::from_str(&contents).map_err(|source| NonceError::Snapshot {
                path: path.to_path_buf(),
                source,
            })?;
        let restored: NonceMap = restored
            .into_iter()
            .map(|(k, v)| (normalize_address(&k), v))
            .collect();

        let mut nonces = self.nonces.lock().await;
        self.persist(&restored)?;
        *nonces = restored;

        logger::warning(
            LogTag::Nonce,
            &format!("Nonce cache restored from {} ({} addresses)", path.display(), nonces.len()),
        );
        Ok(())
    }

    fn persist(&self, nonces: &NonceMap) -> Result<(), NonceError> {
        write_atomic(&self.cache_path, nonces)
    }

    fn log_event(
        &self,
        source: &str,
        address: &str,
        on_chain: Option<u64>,
        local: Option<u64>,
        tx_id: &str,
    ) {
        self.journal.record(
            LogTag::Nonce,
            &NonceEvent {
                tx_id: tx_id.to_string(),
                address: address.to_string(),
                on_chain_nonce: on_chain,
                local_nonce: local,
                timestamp: Utc::now(),
                source: source.to_string(),
            },
        );
    }
}

fn load_cache(path: &Path) -> NonceMap {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return NonceMap::new(),
    };

    match serde_json::from_str::<NonceMap>(&contents) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| (normalize_address(&k), v))
            .collect(),
        Err(e) => {
            logger::warning(
                LogTag::Nonce,
                &format!(
                    "Nonce cache {} is corrupt ({}); starting empty",
                    path.display(),
                    e
                ),
            );
            NonceMap::new()
        }
    }
}

/// Write via a temp file in the same directory, then rename over the target
fn write_atomic(path: &Path, nonces: &NonceMap) -> Result<(), NonceError> {
    let io_err = |source: std::io::Error| NonceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let json = serde_json::to_vec(nonces).map_err(|e| io_err(e.into()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::errors::ChainError;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const ADDR: &str = "0xAbC0000000000000000000000000000000000001";

    fn manager(dir: &TempDir, chain: Arc<MockChain>) -> NonceManager {
        NonceManager::new(
            chain,
            dir.path().join("state/nonce_cache.json"),
            dir.path().join("logs/nonce_log.json"),
        )
    }

    #[tokio::test]
    async fn test_seeds_from_chain_once_then_increments_locally() {
        let dir = TempDir::new().unwrap();
        let chain = Arc::new(MockChain::new().with_count(ADDR, 5));
        let nm = manager(&dir, chain.clone());

        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 5);
        assert_eq!(chain.count_calls.load(Ordering::SeqCst), 1);

        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 6);
        assert_eq!(chain.count_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sequence_strictly_increasing() {
        let dir = TempDir::new().unwrap();
        let nm = manager(&dir, Arc::new(MockChain::new().with_count(ADDR, 41)));

        let mut seen = Vec::new();
        for _ in 0..50 {
            seen.push(nm.get_nonce(ADDR).await.unwrap());
        }
        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(seen[0], 41);
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_share_a_nonce() {
        let dir = TempDir::new().unwrap();
        let nm = Arc::new(manager(&dir, Arc::new(MockChain::new())));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let nm = nm.clone();
                tokio::spawn(async move { nm.get_nonce(ADDR).await.unwrap() })
            })
            .collect();

        let mut values = Vec::new();
        for h in handles {
            values.push(h.await.unwrap());
        }
        values.sort();
        values.dedup();
        assert_eq!(values.len(), 32);
        assert_eq!(values, (0..32).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_address_case_is_normalized() {
        let dir = TempDir::new().unwrap();
        let nm = manager(&dir, Arc::new(MockChain::new().with_count(ADDR, 2)));

        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 2);
        assert_eq!(nm.get_nonce(&ADDR.to_lowercase()).await.unwrap(), 3);

        let cache: BTreeMap<String, u64> =
            serde_json::from_str(&std::fs::read_to_string(nm.cache_path()).unwrap()).unwrap();
        assert_eq!(cache.get(&ADDR.to_lowercase()), Some(&4));
    }

    #[tokio::test]
    async fn test_cache_survives_restart_without_chain_query() {
        let dir = TempDir::new().unwrap();
        {
            let nm = manager(&dir, Arc::new(MockChain::new().with_count(ADDR, 9)));
            nm.get_nonce(ADDR).await.unwrap();
        }

        let chain = Arc::new(MockChain::new().with_count(ADDR, 0));
        let nm = manager(&dir, chain.clone());
        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 10);
        assert_eq!(chain.count_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_and_reset_nonce() {
        let dir = TempDir::new().unwrap();
        let chain = Arc::new(MockChain::new().with_count(ADDR, 3));
        let nm = manager(&dir, chain.clone());

        nm.get_nonce(ADDR).await.unwrap();
        nm.set_nonce(ADDR, 20).await.unwrap();
        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 20);

        nm.reset_nonce(ADDR).await.unwrap();
        assert_eq!(nm.peek(ADDR).await, None);
        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 3);
        assert_eq!(chain.count_calls.load(Ordering::SeqCst), 2);

        let events: Vec<NonceEvent> = nm.journal.read_all().unwrap();
        let sources: Vec<&str> = events.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["get", "update", "get", "reset", "get"]);
    }

    #[tokio::test]
    async fn test_exhausted_nonce_space_is_an_error() {
        let dir = TempDir::new().unwrap();
        let nm = manager(&dir, Arc::new(MockChain::new()));

        nm.set_nonce(ADDR, u64::MAX).await.unwrap();
        assert!(matches!(
            nm.get_nonce(ADDR).await,
            Err(NonceError::Exhausted { .. })
        ));
        assert_eq!(nm.peek(ADDR).await, Some(u64::MAX));
    }

    #[tokio::test]
    async fn test_drift_detected_but_not_corrected() {
        let dir = TempDir::new().unwrap();
        let chain = Arc::new(MockChain::new().with_count(ADDR, 1));
        let nm = manager(&dir, chain.clone());
        nm.get_nonce(ADDR).await.unwrap(); // cache next = 2

        chain.counts.lock().insert(ADDR.to_lowercase(), 5);
        let err = nm.check_drift(ADDR).await.unwrap_err();
        assert!(matches!(
            err,
            NonceError::DriftDetected { cached: 2, on_chain: 5, .. }
        ));
        assert_eq!(nm.peek(ADDR).await, Some(2));
    }

    #[tokio::test]
    async fn test_chain_failure_allocates_nothing() {
        struct DownChain;
        #[async_trait::async_trait]
        impl ChainClient for DownChain {
            async fn transaction_count(&self, _: &str) -> Result<u64, ChainError> {
                Err(ChainError::Timeout(10))
            }
            async fn estimate_gas(&self, _: &[u8], _: &str) -> Result<u64, ChainError> {
                Ok(0)
            }
            async fn send_raw_transaction(&self, _: &[u8]) -> Result<String, ChainError> {
                Ok(String::new())
            }
        }

        let dir = TempDir::new().unwrap();
        let nm = NonceManager::new(
            Arc::new(DownChain),
            dir.path().join("nonce_cache.json"),
            dir.path().join("nonce_log.json"),
        );
        assert!(matches!(
            nm.get_nonce(ADDR).await,
            Err(NonceError::Chain { .. })
        ));
        assert_eq!(nm.peek(ADDR).await, None);
    }

    #[tokio::test]
    async fn test_snapshot_restore_roundtrip() {
        let dir = TempDir::new().unwrap();
        let nm = manager(&dir, Arc::new(MockChain::new().with_count(ADDR, 7)));
        nm.get_nonce(ADDR).await.unwrap();

        let snap = dir.path().join("nonce_snapshot.json");
        nm.snapshot(&snap).await.unwrap();

        nm.get_nonce(ADDR).await.unwrap();
        nm.get_nonce(ADDR).await.unwrap();
        assert_eq!(nm.peek(ADDR).await, Some(10));

        nm.restore(&snap).await.unwrap();
        assert_eq!(nm.peek(ADDR).await, Some(8));
        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_cache_starts_empty() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("state/nonce_cache.json");
        std::fs::create_dir_all(cache.parent().unwrap()).unwrap();
        std::fs::write(&cache, "{not json").unwrap();

        let chain = Arc::new(MockChain::new().with_count(ADDR, 4));
        let nm = NonceManager::new(chain, cache, dir.path().join("log.json"));
        assert_eq!(nm.get_nonce(ADDR).await.unwrap(), 4);
    }
}
