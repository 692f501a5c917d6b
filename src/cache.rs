//! Search result cache with TTL and LRU eviction
//!
//! Memoizes search results keyed on normalized (phrase, mailbox set, scope).
//! Entries are served only while younger than the configured TTL; expired
//! entries are evicted lazily on lookup, and inserting at capacity evicts the
//! least-recently-used entry first.
//!
//! The cache does not reflect new mail until an entry expires — staleness
//! within the TTL window is an accepted tradeoff for speed. Stored records
//! are full fidelity; body and recipient truncation happen at format time,
//! so display limits can change without invalidating cached entries.
//!
//! The cache is explicitly constructed and injected (no ambient singleton)
//! and shared across in-flight tool calls behind a mutex.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::models::{MailboxKind, SearchRequest, SearchResult, SearchScope};

/// Normalized cache key
///
/// Phrase comparison is case-insensitive and whitespace-trimmed to match
/// search semantics; the mailbox set is sorted so request order does not
/// produce distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    phrase: String,
    mailboxes: Vec<MailboxKind>,
    scope: SearchScope,
}

impl CacheKey {
    /// Build the normalized key for a request
    pub fn for_request(request: &SearchRequest) -> Self {
        let mut mailboxes = request.mailboxes.clone();
        mailboxes.sort();
        mailboxes.dedup();
        Self {
            phrase: request.phrase.trim().to_lowercase(),
            mailboxes,
            scope: request.scope,
        }
    }
}

struct CacheEntry {
    result: SearchResult,
    stored_at: Instant,
}

/// Time-and-size-bounded search result cache
pub struct SearchCache {
    entries: LruCache<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl SearchCache {
    /// Create a cache with the given TTL and capacity
    ///
    /// Capacity is clamped to at least one entry.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// Look up a result, refreshing recency on hit
    ///
    /// Expired entries are removed and reported as a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<SearchResult> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.stored_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.result.clone())
    }

    /// Store a result, evicting the least-recently-used entry at capacity
    pub fn put(&mut self, key: CacheKey, result: SearchResult) {
        self.entries.put(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next lookup)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
