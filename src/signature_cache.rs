//! Thought-signature continuity cache.
//!
//! Clients replay assistant turns without the opaque thought signatures the
//! upstream issued, so the proxy remembers them keyed by tool-call id: an
//! in-memory front for the hot path and a JSON store on disk that survives
//! restarts. Disk I/O runs on background tasks through `tokio::fs`; the map
//! locks are never held across a write.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const L1_CAPACITY: usize = 1_000;
const STORE_CAPACITY: usize = 10_000;
const ENTRY_TTL: Duration = Duration::from_secs(60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSignature {
    pub signature: String,
    pub thought_text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

struct L1 {
    entries: HashMap<String, CachedSignature>,
    order: VecDeque<String>,
}

impl L1 {
    fn insert(&mut self, id: String, entry: CachedSignature) {
        if !self.entries.contains_key(&id) {
            while self.order.len() >= L1_CAPACITY {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
            self.order.push_back(id.clone());
        }
        self.entries.insert(id, entry);
    }
}

pub struct SignatureCache {
    l1: Mutex<L1>,
    store: Mutex<HashMap<String, CachedSignature>>,
    path: Option<PathBuf>,
    write_seq: AtomicU64,
    /// Sequence of the newest snapshot on disk; writers skip stale images.
    last_written: Arc<tokio::sync::Mutex<u64>>,
    writes: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    sweep: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SignatureCache {
    /// Opens (or creates) the durable store, sweeps expired entries once and
    /// starts the periodic sweep task.
    pub async fn open(path: PathBuf) -> Arc<Self> {
        let store = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(store) => store,
                Err(e) => {
                    warn!("discarding unreadable signature cache store: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let cache = Arc::new(SignatureCache {
            l1: Mutex::new(L1 {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            store: Mutex::new(store),
            path: Some(path),
            write_seq: AtomicU64::new(0),
            last_written: Arc::new(tokio::sync::Mutex::new(0)),
            writes: Mutex::new(Vec::new()),
            sweep: Mutex::new(None),
        });
        cache.sweep_expired();
        Self::spawn_sweep(&cache);
        cache
    }

    /// Cache with no durable tier; used by tests and as a safe fallback when
    /// the home directory is unavailable.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(SignatureCache {
            l1: Mutex::new(L1 {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            store: Mutex::new(HashMap::new()),
            path: None,
            write_seq: AtomicU64::new(0),
            last_written: Arc::new(tokio::sync::Mutex::new(0)),
            writes: Mutex::new(Vec::new()),
            sweep: Mutex::new(None),
        })
    }

    fn spawn_sweep(cache: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(cache);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately; startup sweep already ran
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(cache) => cache.sweep_expired(),
                    None => break,
                }
            }
        });
        *cache.sweep.lock().unwrap() = Some(handle);
    }

    pub fn store(&self, tool_call_id: &str, signature: &str, thought_text: &str) {
        let entry = CachedSignature {
            signature: signature.to_string(),
            thought_text: thought_text.to_string(),
            timestamp: now_millis(),
        };

        let snapshot = {
            let mut store = self.store.lock().unwrap();
            if store.len() >= STORE_CAPACITY && !store.contains_key(tool_call_id) {
                evict_oldest_decile(&mut store);
            }
            store.insert(tool_call_id.to_string(), entry.clone());
            self.snapshot(&store)
        };

        self.l1
            .lock()
            .unwrap()
            .insert(tool_call_id.to_string(), entry);
        self.spawn_write(snapshot);
    }

    pub fn get(&self, tool_call_id: &str) -> Option<CachedSignature> {
        if let Some(hit) = self.l1.lock().unwrap().entries.get(tool_call_id) {
            return Some(hit.clone());
        }
        let hit = self.store.lock().unwrap().get(tool_call_id).cloned()?;
        self.l1
            .lock()
            .unwrap()
            .insert(tool_call_id.to_string(), hit.clone());
        Some(hit)
    }

    pub fn has(&self, tool_call_id: &str) -> bool {
        self.get(tool_call_id).is_some()
    }

    pub fn size(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn clear(&self) {
        {
            let mut l1 = self.l1.lock().unwrap();
            l1.entries.clear();
            l1.order.clear();
        }
        let snapshot = {
            let mut store = self.store.lock().unwrap();
            store.clear();
            self.snapshot(&store)
        };
        self.spawn_write(snapshot);
    }

    /// Waits for queued durable-store writes to land on disk.
    pub async fn flush(&self) {
        let handles: Vec<_> = self.writes.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Stops the sweep task. In-flight writes complete; the durable store
    /// stays on disk.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweep.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn sweep_expired(&self) {
        let cutoff = now_millis().saturating_sub(ENTRY_TTL.as_millis() as u64);

        let (removed, snapshot) = {
            let mut store = self.store.lock().unwrap();
            let before = store.len();
            store.retain(|_, entry| entry.timestamp > cutoff);
            let removed = before - store.len();
            let snapshot = if removed > 0 {
                self.snapshot(&store)
            } else {
                None
            };
            (removed, snapshot)
        };
        {
            let mut guard = self.l1.lock().unwrap();
            let l1 = &mut *guard;
            l1.entries.retain(|_, entry| entry.timestamp > cutoff);
            let entries = &l1.entries;
            l1.order.retain(|id| entries.contains_key(id));
        }

        if removed > 0 {
            debug!("signature cache sweep removed {} expired entries", removed);
            self.spawn_write(snapshot);
        }
    }

    /// JSON image of the durable tier plus its write sequence, both taken
    /// while the store lock is held so sequence order follows mutation
    /// order. None when there is no durable tier.
    fn snapshot(&self, store: &HashMap<String, CachedSignature>) -> Option<(u64, String)> {
        self.path.as_ref()?;
        match serde_json::to_string(store) {
            Ok(json) => Some((self.write_seq.fetch_add(1, Ordering::SeqCst), json)),
            Err(e) => {
                warn!("cannot serialize signature cache: {}", e);
                None
            }
        }
    }

    /// Hands a snapshot to a background task; the disk write suspends there,
    /// never under the map lock. Sequence numbers keep a stale image from
    /// overwriting a newer one when writes race.
    fn spawn_write(&self, snapshot: Option<(u64, String)>) {
        let (Some((seq, snapshot)), Some(path)) = (snapshot, self.path.clone()) else {
            return;
        };
        let last_written = Arc::clone(&self.last_written);

        let handle = tokio::spawn(async move {
            let mut last = last_written.lock().await;
            if seq < *last {
                return;
            }
            *last = seq;
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!("cannot create {}: {}", parent.display(), e);
                    return;
                }
            }
            if let Err(e) = tokio::fs::write(&path, snapshot).await {
                warn!("cannot persist signature cache: {}", e);
            }
        });

        let mut writes = self.writes.lock().unwrap();
        writes.retain(|h| !h.is_finished());
        writes.push(handle);
    }
}

impl Drop for SignatureCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep.lock().unwrap().take() {
            handle.abort();
        }
    }
}

fn evict_oldest_decile(store: &mut HashMap<String, CachedSignature>) {
    let mut by_age: Vec<(String, u64)> = store
        .iter()
        .map(|(id, entry)| (id.clone(), entry.timestamp))
        .collect();
    by_age.sort_by_key(|(_, ts)| *ts);
    for (id, _) in by_age.iter().take(STORE_CAPACITY / 10) {
        store.remove(id);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let cache = SignatureCache::in_memory();
        cache.store("call_1", "sig123", "I should call a function");

        let hit = cache.get("call_1").unwrap();
        assert_eq!(hit.signature, "sig123");
        assert_eq!(hit.thought_text, "I should call a function");
        assert!(cache.has("call_1"));
        assert!(!cache.has("call_2"));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = SignatureCache::in_memory();
        cache.store("call_1", "old", "a");
        cache.store("call_1", "new", "b");
        assert_eq!(cache.get("call_1").unwrap().signature, "new");
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = SignatureCache::in_memory();
        cache.store("call_1", "sig", "");
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert!(!cache.has("call_1"));
    }

    #[test]
    fn test_expired_entries_are_swept() {
        let cache = SignatureCache::in_memory();
        cache.store("old", "sig", "");
        cache
            .store
            .lock()
            .unwrap()
            .get_mut("old")
            .unwrap()
            .timestamp = now_millis() - ENTRY_TTL.as_millis() as u64 - 1_000;
        // L1 still holds the stale copy; expire it there too
        cache.l1.lock().unwrap().entries.get_mut("old").unwrap().timestamp =
            now_millis() - ENTRY_TTL.as_millis() as u64 - 1_000;

        cache.sweep_expired();
        assert!(!cache.has("old"));
    }

    #[test]
    fn test_capacity_eviction_drops_oldest_decile() {
        let cache = SignatureCache::in_memory();
        {
            let mut store = cache.store.lock().unwrap();
            for i in 0..STORE_CAPACITY {
                store.insert(
                    format!("call_{}", i),
                    CachedSignature {
                        signature: "sig".to_string(),
                        thought_text: String::new(),
                        timestamp: i as u64,
                    },
                );
            }
        }

        cache.store("call_new", "sig", "");
        // Oldest 10% gone, newcomer present
        assert!(cache.get("call_0").is_none());
        assert!(cache.get(&format!("call_{}", STORE_CAPACITY / 10 - 1)).is_none());
        assert!(cache.get(&format!("call_{}", STORE_CAPACITY / 10)).is_some());
        assert!(cache.has("call_new"));
    }

    #[test]
    fn test_l1_insertion_order_eviction() {
        let cache = SignatureCache::in_memory();
        for i in 0..(L1_CAPACITY + 10) {
            cache.store(&format!("call_{}", i), "sig", "");
        }
        let l1 = cache.l1.lock().unwrap();
        assert_eq!(l1.entries.len(), L1_CAPACITY);
        assert!(!l1.entries.contains_key("call_0"));
        assert!(l1.entries.contains_key(&format!("call_{}", L1_CAPACITY + 9)));
    }

    #[tokio::test]
    async fn test_durable_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signature-cache.json");

        {
            let cache = SignatureCache::open(path.clone()).await;
            cache.store("call_1", "sig123", "thought");
            cache.flush().await;
            cache.destroy();
        }

        let reopened = SignatureCache::open(path).await;
        let hit = reopened.get("call_1").unwrap();
        assert_eq!(hit.signature, "sig123");
        assert_eq!(hit.thought_text, "thought");
        reopened.destroy();
    }

    #[tokio::test]
    async fn test_flush_waits_for_latest_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signature-cache.json");

        let cache = SignatureCache::open(path.clone()).await;
        cache.store("call_1", "first", "");
        cache.store("call_1", "second", "");
        cache.flush().await;

        let on_disk: HashMap<String, CachedSignature> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["call_1"].signature, "second");
        cache.destroy();
    }

    #[test]
    fn test_get_populates_l1_from_store() {
        let cache = SignatureCache::in_memory();
        cache.store("call_1", "sig", "");
        cache.l1.lock().unwrap().entries.clear();
        cache.l1.lock().unwrap().order.clear();

        assert!(cache.get("call_1").is_some());
        assert!(cache.l1.lock().unwrap().entries.contains_key("call_1"));
    }
}
