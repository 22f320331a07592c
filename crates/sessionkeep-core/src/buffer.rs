//! Debounced per-key write buffer.
//!
//! Each key holds at most one pending value and one cancellable timer. A new
//! write to a key with a pending slot coalesces into it and restarts the
//! timer; the flush callback runs once the window elapses with no further
//! writes. Intermediate values are dropped.
//!
//! Flushes for the same key are serialized by a per-key lock, so `cancel`
//! can wait out a flush that already started before the caller deletes the
//! underlying record.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, join_all};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sessionkeep_types::session::SessionPatch;

/// How a newer pending value folds into an older one.
pub trait Coalesce {
    fn coalesce(&mut self, newer: Self);
}

impl Coalesce for SessionPatch {
    fn coalesce(&mut self, newer: Self) {
        self.merge(newer);
    }
}

/// Encoded credential payloads: the last value wins outright.
impl Coalesce for String {
    fn coalesce(&mut self, newer: Self) {
        *self = newer;
    }
}

type FlushFn<K, V> = Arc<dyn Fn(K, V) -> BoxFuture<'static, ()> + Send + Sync>;

struct PendingSlot<V> {
    value: V,
    generation: u64,
    timer: CancellationToken,
}

struct Inner<K, V>
where
    K: Eq + Hash,
{
    slots: DashMap<K, PendingSlot<V>>,
    locks: DashMap<K, Arc<Mutex<()>>>,
    next_generation: AtomicU64,
    window: Duration,
    flush: FlushFn<K, V>,
}

/// Write buffer holding one coalesced pending value per key.
pub struct WriteBuffer<K, V>
where
    K: Eq + Hash,
{
    inner: Arc<Inner<K, V>>,
}

impl<K, V> WriteBuffer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Coalesce + Send + Sync + 'static,
{
    /// Create a buffer that calls `flush(key, value)` after `window` of quiet.
    pub fn new<F>(window: Duration, flush: F) -> Self
    where
        F: Fn(K, V) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                locks: DashMap::new(),
                next_generation: AtomicU64::new(0),
                window,
                flush: Arc::new(flush),
            }),
        }
    }

    /// Queue a value for `key`, merging with any pending value and restarting the timer.
    pub fn enqueue(&self, key: K, value: V) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = CancellationToken::new();

        match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.timer.cancel();
                slot.value.coalesce(value);
                slot.generation = generation;
                slot.timer = timer.clone();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingSlot {
                    value,
                    generation,
                    timer: timer.clone(),
                });
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(inner.window) => {
                    inner.flush_key(key, Some(generation)).await;
                }
            }
        });
    }

    /// Flush the pending value for `key` now. Returns false if nothing was pending.
    pub async fn flush(&self, key: &K) -> bool {
        self.inner.flush_key(key.clone(), None).await
    }

    /// Flush every pending slot. Returns how many were flushed.
    pub async fn flush_all(&self) -> usize {
        let keys: Vec<K> = self.inner.slots.iter().map(|e| e.key().clone()).collect();
        let results = join_all(
            keys.into_iter()
                .map(|key| self.inner.flush_key(key, None)),
        )
        .await;
        results.into_iter().filter(|flushed| *flushed).count()
    }

    /// Drop the pending value for `key` without writing it.
    ///
    /// Waits for a flush of the same key that is already running, so the
    /// caller can safely delete the record afterwards.
    pub async fn cancel(&self, key: &K) -> bool {
        let dropped = match self.inner.slots.remove(key) {
            Some((_, slot)) => {
                slot.timer.cancel();
                true
            }
            None => false,
        };
        self.inner.wait_for_flush(key).await;
        dropped
    }

    /// Drop every pending value whose key matches `pred`. Returns how many were dropped.
    pub async fn cancel_matching<P>(&self, pred: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let keys: Vec<K> = self
            .inner
            .slots
            .iter()
            .filter(|e| pred(e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut dropped = 0;
        for key in &keys {
            if let Some((_, slot)) = self.inner.slots.remove(key) {
                slot.timer.cancel();
                dropped += 1;
            }
        }

        let in_flight: Vec<K> = self
            .inner
            .locks
            .iter()
            .filter(|e| pred(e.key()))
            .map(|e| e.key().clone())
            .collect();
        for key in &in_flight {
            self.inner.wait_for_flush(key).await;
        }
        dropped
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.slots.contains_key(key)
    }

    /// Number of keys with a pending value.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Take the slot for `key` and write it. With `expected` set, only a slot
    /// still at that generation is taken, so a stale timer never flushes a
    /// newer value early.
    async fn flush_key(&self, key: K, expected: Option<u64>) -> bool {
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let flushed = {
            let _guard = lock.lock().await;
            let taken = match expected {
                Some(generation) => self
                    .slots
                    .remove_if(&key, |_, slot| slot.generation == generation),
                None => self.slots.remove(&key),
            };
            match taken {
                Some((key, slot)) => {
                    slot.timer.cancel();
                    (self.flush)(key, slot.value).await;
                    true
                }
                None => false,
            }
        };
        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        flushed
    }

    async fn wait_for_flush(&self, key: &K) {
        let lock = self.locks.get(key).map(|entry| Arc::clone(entry.value()));
        if let Some(lock) = lock {
            let _guard = lock.lock().await;
        }
    }
}
