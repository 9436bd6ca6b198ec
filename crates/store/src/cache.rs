//! Read caches for messages and queue mappings.
//!
//! Both caches are weight-bounded rather than entry-bounded so a handful of
//! large payloads cannot blow past the memory the operator granted. Entries
//! are only ever populated after a successful commit and are invalidated
//! before any delete or move commits, so a cache hit never resurrects a row
//! the database has dropped.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use silo_core::{ContentChunk, Message};

/// An LRU cache that evicts by accumulated entry weight instead of entry
/// count.
pub(crate) struct WeightedLruCache<K: Hash + Eq, V> {
    entries: LruCache<K, (V, usize)>,
    weight: usize,
    max_weight: usize,
}

impl<K: Hash + Eq, V> WeightedLruCache<K, V> {
    pub fn new(max_weight: usize) -> Self {
        WeightedLruCache {
            entries: LruCache::unbounded(),
            weight: 0,
            max_weight,
        }
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|(value, _)| value)
    }

    pub fn put(&mut self, key: K, value: V, weight: usize) {
        if let Some((_, old_weight)) = self.entries.put(key, (value, weight)) {
            self.weight -= old_weight;
        }
        self.weight += weight;
        while self.weight > self.max_weight {
            match self.entries.pop_lru() {
                Some((_, (_, evicted))) => self.weight -= evicted,
                None => break,
            }
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.pop(key).map(|(value, weight)| {
            self.weight -= weight;
            value
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.weight = 0;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn current_weight(&self) -> usize {
        self.weight
    }
}

/// Cache over fully assembled messages, keyed by message id.
pub trait MessageCache: Send + Sync {
    fn put(&self, message: &Message);
    fn get(&self, message_id: u64) -> Option<Message>;
    fn get_chunk(&self, message_id: u64, offset: i32) -> Option<ContentChunk>;
    fn invalidate(&self, message_id: u64);
    fn invalidate_many(&self, message_ids: &[u64]);
    fn clear(&self);
}

fn message_weight(message: &Message) -> usize {
    (message.metadata.len() + message.content_size()).max(1)
}

/// Weight-bounded LRU message cache.
pub struct LruMessageCache {
    messages: Mutex<WeightedLruCache<u64, Message>>,
}

impl LruMessageCache {
    pub fn new(max_weight: usize) -> Self {
        LruMessageCache {
            messages: Mutex::new(WeightedLruCache::new(max_weight)),
        }
    }
}

impl MessageCache for LruMessageCache {
    fn put(&self, message: &Message) {
        let weight = message_weight(message);
        self.messages
            .lock()
            .put(message.message_id, message.clone(), weight);
    }

    fn get(&self, message_id: u64) -> Option<Message> {
        self.messages.lock().get(&message_id).cloned()
    }

    fn get_chunk(&self, message_id: u64, offset: i32) -> Option<ContentChunk> {
        let mut messages = self.messages.lock();
        let message = messages.get(&message_id)?;
        message
            .chunks
            .iter()
            .find(|chunk| chunk.offset == offset)
            .cloned()
    }

    fn invalidate(&self, message_id: u64) {
        self.messages.lock().remove(&message_id);
    }

    fn invalidate_many(&self, message_ids: &[u64]) {
        let mut messages = self.messages.lock();
        for message_id in message_ids {
            messages.remove(message_id);
        }
    }

    fn clear(&self) {
        self.messages.lock().clear();
    }
}

/// Cache used when the operator sets the message cache weight to zero.
pub struct DisabledMessageCache;

impl MessageCache for DisabledMessageCache {
    fn put(&self, _message: &Message) {}

    fn get(&self, _message_id: u64) -> Option<Message> {
        None
    }

    fn get_chunk(&self, _message_id: u64, _offset: i32) -> Option<ContentChunk> {
        None
    }

    fn invalidate(&self, _message_id: u64) {}

    fn invalidate_many(&self, _message_ids: &[u64]) {}

    fn clear(&self) {}
}

pub(crate) fn message_cache_from_config(max_weight: usize) -> Arc<dyn MessageCache> {
    if max_weight == 0 {
        Arc::new(DisabledMessageCache)
    } else {
        Arc::new(LruMessageCache::new(max_weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(message_id: u64, payload: &[u8]) -> Message {
        Message {
            message_id,
            queue: "orders".to_string(),
            destination: "orders".to_string(),
            expiration_time: None,
            metadata: vec![0; 8],
            chunks: vec![ContentChunk::new(message_id, 0, payload.to_vec())],
        }
    }

    #[test]
    fn test_weighted_cache_evicts_least_recent_first() {
        let mut cache: WeightedLruCache<u64, &str> = WeightedLruCache::new(10);
        cache.put(1, "a", 4);
        cache.put(2, "b", 4);
        // Touch 1 so 2 becomes the eviction candidate.
        assert!(cache.get(&1).is_some());
        cache.put(3, "c", 4);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&2).is_none());
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&3).is_some());
    }

    #[test]
    fn test_weighted_cache_replacement_adjusts_weight() {
        let mut cache: WeightedLruCache<u64, &str> = WeightedLruCache::new(100);
        cache.put(1, "a", 30);
        cache.put(1, "b", 10);
        assert_eq!(cache.current_weight(), 10);
        cache.remove(&1);
        assert_eq!(cache.current_weight(), 0);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_oversized_entry_does_not_stick() {
        let mut cache: WeightedLruCache<u64, &str> = WeightedLruCache::new(5);
        cache.put(1, "huge", 50);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_weight(), 0);
    }

    #[test]
    fn test_message_cache_round_trip_and_chunk_lookup() {
        let cache = LruMessageCache::new(1024);
        let msg = message(42, b"payload");
        cache.put(&msg);
        assert_eq!(cache.get(42), Some(msg));
        let chunk = cache.get_chunk(42, 0).unwrap();
        assert_eq!(chunk.data, b"payload");
        assert!(cache.get_chunk(42, 1).is_none());
        cache.invalidate(42);
        assert!(cache.get(42).is_none());
    }

    #[test]
    fn test_invalidate_many() {
        let cache = LruMessageCache::new(1024);
        cache.put(&message(1, b"a"));
        cache.put(&message(2, b"b"));
        cache.put(&message(3, b"c"));
        cache.invalidate_many(&[1, 3]);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_none());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = DisabledMessageCache;
        cache.put(&message(1, b"a"));
        assert!(cache.get(1).is_none());
        assert!(cache.get_chunk(1, 0).is_none());
    }
}
