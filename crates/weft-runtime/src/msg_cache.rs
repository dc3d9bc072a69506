//! Content-hash message cache for bandwidth dedup.

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;
use weft_proto::ForwardMsg;

#[derive(Debug)]
struct CacheEntry {
    msg: ForwardMsg,
    /// Per session: the session run count when the message was last
    /// referenced. Entries age out per session, not globally.
    session_refs: FxHashMap<SmolStr, u64>,
}

/// Deduplicates large repeated messages across a runtime's sessions.
///
/// A cacheable message above the configured size threshold is delivered
/// whole once per session and as a [`ForwardMsg::Ref`] afterwards; the
/// transport layer answers frontend fetches for the full payload out of
/// this cache. Entries expire once every referencing session has run more
/// than `max_age` times without touching them.
#[derive(Debug, Default)]
pub struct ForwardMsgCache {
    entries: Mutex<FxHashMap<SmolStr, CacheEntry>>,
}

impl ForwardMsgCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how `msg` travels to `session_id`: whole, or as a reference
    /// to an identical payload that session already received.
    ///
    /// `threshold` is the minimum serialized size worth caching; small
    /// messages always travel whole and are never recorded.
    #[must_use]
    pub fn prepare(
        &self,
        msg: &ForwardMsg,
        session_id: &str,
        run_count: u64,
        threshold: usize,
    ) -> ForwardMsg {
        if !msg.cacheable() || msg.encoded().len() < threshold {
            return msg.clone();
        }
        let hash = msg.hash();
        let mut entries = self.entries.lock().expect("message cache lock poisoned");
        let entry = entries.entry(hash.clone()).or_insert_with(|| CacheEntry {
            msg: msg.clone(),
            session_refs: FxHashMap::default(),
        });
        let seen_before = entry.session_refs.contains_key(session_id);
        entry.session_refs.insert(SmolStr::new(session_id), run_count);
        if seen_before {
            debug!(%hash, session = session_id, "replacing repeated message with ref");
            ForwardMsg::Ref { hash }
        } else {
            msg.clone()
        }
    }

    /// Fetch a cached message by hash, for transport-level re-delivery.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<ForwardMsg> {
        self.entries
            .lock()
            .expect("message cache lock poisoned")
            .get(hash)
            .map(|entry| entry.msg.clone())
    }

    /// Whether a hash is cached.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.entries
            .lock()
            .expect("message cache lock poisoned")
            .contains_key(hash)
    }

    /// Age out entries `session_id` has not referenced within `max_age`
    /// runs, dropping entries no session references at all.
    pub fn remove_expired(&self, session_id: &str, run_count: u64, max_age: u64) {
        let mut entries = self.entries.lock().expect("message cache lock poisoned");
        for entry in entries.values_mut() {
            let expired = entry
                .session_refs
                .get(session_id)
                .is_some_and(|last| run_count.saturating_sub(*last) > max_age);
            if expired {
                entry.session_refs.remove(session_id);
            }
        }
        entries.retain(|hash, entry| {
            let keep = !entry.session_refs.is_empty();
            if !keep {
                debug!(%hash, "evicting unreferenced cached message");
            }
            keep
        });
    }

    /// Forget a closed session entirely.
    pub fn remove_session(&self, session_id: &str) {
        let mut entries = self.entries.lock().expect("message cache lock poisoned");
        for entry in entries.values_mut() {
            entry.session_refs.remove(session_id);
        }
        entries.retain(|_, entry| !entry.session_refs.is_empty());
    }

    /// Number of cached payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("message cache lock poisoned")
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_proto::{Delta, Element};

    fn big_delta(body_len: usize) -> ForwardMsg {
        ForwardMsg::Delta(Delta::at(
            0,
            Element::Text {
                body: "x".repeat(body_len),
            },
        ))
    }

    #[test]
    fn second_delivery_becomes_a_ref() {
        let cache = ForwardMsgCache::new();
        let msg = big_delta(256);

        let first = cache.prepare(&msg, "s1", 1, 64);
        assert_eq!(first, msg);

        let second = cache.prepare(&msg, "s1", 2, 64);
        let ForwardMsg::Ref { hash } = second else {
            panic!("expected a ref, got {second:?}");
        };
        assert_eq!(cache.get(&hash), Some(msg));
    }

    #[test]
    fn sessions_do_not_share_first_delivery() {
        let cache = ForwardMsgCache::new();
        let msg = big_delta(256);
        let _ = cache.prepare(&msg, "s1", 1, 64);
        // A different session still needs the whole payload once.
        assert_eq!(cache.prepare(&msg, "s2", 1, 64), msg);
    }

    #[test]
    fn small_messages_are_never_cached() {
        let cache = ForwardMsgCache::new();
        let msg = big_delta(4);
        let _ = cache.prepare(&msg, "s1", 1, 1024);
        let _ = cache.prepare(&msg, "s1", 2, 1024);
        assert!(cache.is_empty());
    }

    #[test]
    fn entries_age_out_per_session() {
        let cache = ForwardMsgCache::new();
        let msg = big_delta(256);
        let _ = cache.prepare(&msg, "s1", 1, 64);
        assert_eq!(cache.len(), 1);

        // Within the age window the entry stays.
        cache.remove_expired("s1", 2, 2);
        assert_eq!(cache.len(), 1);

        // Three runs later with max age 2 it is gone.
        cache.remove_expired("s1", 4, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_session_drops_orphaned_entries() {
        let cache = ForwardMsgCache::new();
        let msg = big_delta(256);
        let _ = cache.prepare(&msg, "s1", 1, 64);
        let _ = cache.prepare(&msg, "s2", 1, 64);

        cache.remove_session("s1");
        assert_eq!(cache.len(), 1);
        cache.remove_session("s2");
        assert!(cache.is_empty());
    }
}
