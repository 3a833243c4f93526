//! Content-addressed response cache with TTL expiration, LRU eviction,
//! and single-flight deduplication of concurrent misses (§4.E).
//!
//! The LRU/TTL store follows the `AsyncCache` shape in the
//! intelligence-layer crate this crate is grounded on (a
//! `tokio::sync::Mutex`-guarded map behind an `Arc`). Single-flight
//! coordination is new: the teacher's cache has no equivalent, since
//! nothing in its test suite drives concurrent identical misses.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::{Mutex, broadcast};

use crate::error::RagError;

/// A cached answer, keyed by [`fingerprint`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub answer: String,
    pub model_id: String,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// Computes the fingerprint of a query: a hash of the normalized prompt
/// plus the effective model set signature.
pub fn fingerprint(normalized_prompt: &str, model_set_signature: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    normalized_prompt.hash(&mut hasher);
    model_set_signature.hash(&mut hasher);
    hasher.finish()
}

/// Normalizes a prompt for fingerprinting: trims and collapses internal
/// whitespace so cosmetic differences don't bust the cache.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Inner {
    store: LruCache<u64, CacheEntry>,
    in_flight: HashMap<u64, broadcast::Sender<Result<CacheEntry, RagError>>>,
}

/// Process-wide response cache. Only this type mutates its entries
/// (§3 Ownership).
pub struct ResponseCache {
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner {
                store: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Returns a cached, non-expired entry if one exists, without
    /// triggering computation.
    pub async fn get(&self, fp: u64) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        if let Some(entry) = inner.store.get(&fp) {
            if !entry.is_expired(now) {
                return Some(entry.clone());
            }
        }
        inner.store.pop(&fp);
        None
    }

    /// Looks up `fp`; on miss, deduplicates concurrent callers for the
    /// same fingerprint (single-flight) and runs `compute` exactly once.
    /// Returns `(entry, was_cache_hit)`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fp: u64,
        compute: F,
    ) -> Result<(CacheEntry, bool), RagError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CacheEntry, RagError>>,
    {
        loop {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            if let Some(entry) = inner.store.get(&fp) {
                if !entry.is_expired(now) {
                    return Ok((entry.clone(), true));
                }
                inner.store.pop(&fp);
            }

            if let Some(sender) = inner.in_flight.get(&fp) {
                // Someone else is already computing this fingerprint;
                // await their result instead of invoking the model again.
                let mut receiver = sender.subscribe();
                drop(inner);
                match receiver.recv().await {
                    Ok(result) => return result.map(|entry| (entry, false)),
                    Err(_) => continue, // sender dropped mid-flight; retry as leader
                }
            }

            // We are the leader for this fingerprint.
            let (tx, _rx) = broadcast::channel(1);
            inner.in_flight.insert(fp, tx.clone());
            drop(inner);

            let result = compute().await;

            let mut inner = self.inner.lock().await;
            inner.in_flight.remove(&fp);
            if let Ok(entry) = &result {
                if inner.store.len() >= inner.store.cap().get() {
                    tracing::debug!(fingerprint = fp, "cache at capacity, evicting lru entry");
                }
                inner.store.put(fp, entry.clone());
            }
            drop(inner);

            let _ = tx.send(result.clone());
            return result.map(|entry| (entry, false));
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn miss_then_hit_returns_cached_entry() {
        let cache = ResponseCache::new(10);
        let fp = fingerprint("prompt", "model-a");
        let calls = AtomicUsize::new(0);
        let (entry, hit) = cache
            .get_or_compute(fp, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CacheEntry {
                    answer: "A".into(),
                    model_id: "model-a".into(),
                    created_at: Instant::now(),
                    ttl: Duration::from_secs(3600),
                })
            })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(entry.answer, "A");

        let (entry2, hit2) = cache
            .get_or_compute(fp, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                unreachable!("should not recompute on cache hit")
            })
            .await
            .unwrap();
        assert!(hit2);
        assert_eq!(entry2.answer, "A");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_treated_as_misses() {
        let cache = ResponseCache::new(10);
        let fp = fingerprint("p", "m");
        cache
            .get_or_compute(fp, || async {
                Ok(CacheEntry {
                    answer: "old".into(),
                    model_id: "m".into(),
                    created_at: Instant::now() - Duration::from_secs(7200),
                    ttl: Duration::from_secs(3600),
                })
            })
            .await
            .unwrap();

        let (entry, hit) = cache
            .get_or_compute(fp, || async {
                Ok(CacheEntry {
                    answer: "new".into(),
                    model_id: "m".into(),
                    created_at: Instant::now(),
                    ttl: Duration::from_secs(3600),
                })
            })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(entry.answer, "new");
    }

    #[tokio::test]
    async fn concurrent_misses_single_flight_to_one_computation() {
        let cache = Arc::new(ResponseCache::new(10));
        let fp = fingerprint("p", "m");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(fp, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(CacheEntry {
                            answer: "shared".into(),
                            model_id: "m".into(),
                            created_at: Instant::now(),
                            ttl: Duration::from_secs(3600),
                        })
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut answers = Vec::new();
        for handle in handles {
            answers.push(handle.await.unwrap().0.answer);
        }
        assert!(answers.iter().all(|a| a == "shared"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
