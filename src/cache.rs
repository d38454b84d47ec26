//! Process-wide cache of processed documents.
//!
//! Keyed by URL. Each key holds a slot whose build runs as a detached task:
//! callers racing on the same URL wait on that one build, each under its own
//! deadline, so a caller giving up does not restart the work for the others.
//! The build is aborted only once every waiter has gone. A failed build drops
//! the slot so later requests retry. Entries are handed out as `Arc`s, so
//! eviction never frees an index that a running request still searches.
//!
//! Indexes are additionally shared by content hash: when a URL is re-fetched
//! (after expiry or under a different URL) and normalizes to the same text,
//! the existing index is reused without re-embedding.

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::config::CacheConfig;
use crate::documents::Document;
use crate::error::PipelineError;
use crate::semantic::VectorIndex;

/// A fetched, parsed and indexed document.
#[derive(Debug)]
pub struct CachedDocument {
    pub document: Document,
    pub index: Arc<VectorIndex>,
    pub built_at: Instant,
}

impl CachedDocument {
    pub fn new(document: Document, index: Arc<VectorIndex>) -> Self {
        Self {
            document,
            index,
            built_at: Instant::now(),
        }
    }
}

/// Whether [`DocumentCache::get_or_build`] started the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Built,
}

/// Result of a slot's build; `None` while it runs.
type BuildState = Option<Result<Arc<CachedDocument>, PipelineError>>;

/// One URL's build, shared by every caller waiting on it.
struct Slot {
    state: watch::Receiver<BuildState>,
    waiters: AtomicUsize,
    task: AbortHandle,
}

impl Slot {
    fn spawn<Fut>(build: Fut, builds: Arc<AtomicUsize>) -> Arc<Self>
    where
        Fut: Future<Output = Result<CachedDocument, PipelineError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let result = build.await.map(Arc::new);
            if result.is_ok() {
                builds.fetch_add(1, Ordering::Relaxed);
            }
            tx.send_replace(Some(result));
        });
        Arc::new(Self {
            state: rx,
            waiters: AtomicUsize::new(0),
            task: handle.abort_handle(),
        })
    }

    fn ready(&self) -> Option<Arc<CachedDocument>> {
        match &*self.state.borrow() {
            Some(Ok(cached)) => Some(cached.clone()),
            _ => None,
        }
    }

    fn is_pending(&self) -> bool {
        self.state.borrow().is_none()
    }

    fn has_failed(&self) -> bool {
        matches!(&*self.state.borrow(), Some(Err(_)))
    }

    async fn wait(&self) -> Result<Arc<CachedDocument>, PipelineError> {
        let mut state = self.state.clone();
        let finished = match state.wait_for(Option::is_some).await {
            Ok(current) => current.clone(),
            Err(_) => None,
        };
        // The sender only goes away without a value if the task panicked or was aborted
        finished.unwrap_or_else(|| {
            Err(PipelineError::BuildAborted(
                "document build task stopped".to_string(),
            ))
        })
    }
}

/// Registration of one caller on a slot. Dropping the last waiter of an
/// unfinished build aborts it.
struct Waiter<'a> {
    cache: &'a DocumentCache,
    url: &'a str,
    slot: Arc<Slot>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut slots = self.cache.slots.lock();
        let last = self.slot.waiters.fetch_sub(1, Ordering::AcqRel) == 1;
        if last && self.slot.is_pending() {
            self.slot.task.abort();
            if slots
                .peek(self.url)
                .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
            {
                slots.pop(self.url);
            }
            tracing::debug!(target: "cache", "build abandoned: {}", self.url);
        }
    }
}

/// Summary of one cached document.
#[derive(Debug, Clone, Serialize)]
pub struct CachedEntryStats {
    pub url: String,
    pub content_hash: String,
    pub format: String,
    pub words: usize,
    pub chunks: usize,
    pub model_id: String,
    pub age_secs: u64,
}

/// Snapshot of cache contents and counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
    pub hits: usize,
    pub builds: usize,
    pub shared_indexes: usize,
    pub entries: Vec<CachedEntryStats>,
}

pub struct DocumentCache {
    slots: Mutex<LruCache<String, Arc<Slot>>>,
    by_content: DashMap<String, Weak<VectorIndex>>,
    ttl: Option<Duration>,
    hits: AtomicUsize,
    builds: Arc<AtomicUsize>,
}

impl DocumentCache {
    /// Create a cache holding up to `capacity` documents. `ttl` of `None`
    /// keeps entries until evicted.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            by_content: DashMap::new(),
            ttl,
            hits: AtomicUsize::new(0),
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self::new(config.capacity, ttl)
    }

    fn is_expired(&self, cached: &CachedDocument) -> bool {
        self.ttl
            .is_some_and(|ttl| cached.built_at.elapsed() >= ttl)
    }

    /// Join the live slot for `url`, or start `build` in a new one.
    ///
    /// The caller is counted as a waiter before the lock is released.
    fn join_or_spawn<F, Fut>(&self, url: &str, build: F) -> (Arc<Slot>, CacheOutcome)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedDocument, PipelineError>> + Send + 'static,
    {
        let mut slots = self.slots.lock();

        if let Some(slot) = slots.get(url) {
            let stale = match slot.ready() {
                Some(cached) => self.is_expired(&cached),
                None => slot.has_failed(),
            };
            if stale {
                tracing::debug!(target: "cache", "entry expired: {url}");
            } else {
                slot.waiters.fetch_add(1, Ordering::AcqRel);
                return (slot.clone(), CacheOutcome::Hit);
            }
        }

        let slot = Slot::spawn(build(), self.builds.clone());
        slot.waiters.fetch_add(1, Ordering::AcqRel);
        if let Some((evicted, _)) = slots.push(url.to_string(), slot.clone()) {
            if evicted != url {
                tracing::debug!(target: "cache", "evicted {evicted}");
            }
        }
        (slot, CacheOutcome::Built)
    }

    /// Return the cached document for `url`, starting `build` if absent.
    ///
    /// Concurrent callers for the same URL share a single build. The build
    /// runs detached: it keeps going while any caller still waits on it, even
    /// if the caller that started it has given up.
    pub async fn get_or_build<F, Fut>(
        &self,
        url: &str,
        build: F,
    ) -> Result<(Arc<CachedDocument>, CacheOutcome), PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedDocument, PipelineError>> + Send + 'static,
    {
        let (slot, outcome) = self.join_or_spawn(url, build);
        let waiter = Waiter {
            cache: self,
            url,
            slot,
        };

        match waiter.slot.wait().await {
            Ok(cached) => {
                if outcome == CacheOutcome::Hit {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                Ok((cached, outcome))
            }
            Err(e) => {
                self.remove_slot(url, &waiter.slot);
                Err(e)
            }
        }
    }

    /// Drop `url`'s slot if it is still `slot`.
    fn remove_slot(&self, url: &str, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock();
        if slots.peek(url).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.pop(url);
        }
    }

    /// Cached document for `url` without building or touching recency.
    pub fn peek(&self, url: &str) -> Option<Arc<CachedDocument>> {
        let slots = self.slots.lock();
        slots
            .peek(url)
            .and_then(|slot| slot.ready())
            .filter(|cached| !self.is_expired(cached))
    }

    /// Index previously built for identical normalized text, if still alive.
    pub fn shared_index(&self, content_hash: &str) -> Option<Arc<VectorIndex>> {
        let index = self.by_content.get(content_hash)?.upgrade();
        if index.is_none() {
            self.by_content.remove(content_hash);
        }
        index
    }

    /// Make `index` reusable by other URLs with the same content.
    pub fn register_index(&self, content_hash: &str, index: &Arc<VectorIndex>) {
        self.by_content.retain(|_, weak| weak.strong_count() > 0);
        self.by_content
            .insert(content_hash.to_string(), Arc::downgrade(index));
    }

    /// Forget `url` and the index shared under its content hash.
    pub fn invalidate(&self, url: &str) {
        let removed = self.slots.lock().pop(url);
        if let Some(cached) = removed.as_ref().and_then(|slot| slot.ready()) {
            self.by_content.remove(&cached.document.content_hash);
        }
        tracing::debug!(target: "cache", "invalidated {url}");
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
        self.by_content.clear();
        tracing::debug!(target: "cache", "cleared");
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.lock();
        let entries = slots
            .iter()
            .filter_map(|(url, slot)| {
                let cached = slot.ready()?;
                Some(CachedEntryStats {
                    url: url.clone(),
                    content_hash: cached.document.content_hash.clone(),
                    format: cached.document.format.to_string(),
                    words: cached.document.word_count(),
                    chunks: cached.index.len(),
                    model_id: cached.index.model_id().to_string(),
                    age_secs: cached.built_at.elapsed().as_secs(),
                })
            })
            .collect();

        CacheStats {
            capacity: slots.cap().get(),
            ttl_secs: self.ttl.map(|ttl| ttl.as_secs()),
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            shared_indexes: self.by_content.len(),
            entries,
        }
    }
}
