use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::AnalysisDocument;

/// Session-scoped cache of fetched analysis documents, keyed by track id.
///
/// Entries expire after the TTL and the whole cache dies with its resolver.
/// Nothing here is ever written to disk: derived structure is recomputed
/// fresh each session.
pub struct AnalysisCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

struct CacheEntry {
    fetched_at: Instant,
    doc: AnalysisDocument,
}

impl AnalysisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Look up a fresh document. Stale entries read as misses.
    pub fn get(&self, track_id: &str) -> Option<&AnalysisDocument> {
        let entry = self.entries.get(track_id)?;
        if entry.fetched_at.elapsed() > self.ttl {
            log::debug!("Cache entry for {track_id} is stale");
            return None;
        }
        Some(&entry.doc)
    }

    /// Store a document, evicting anything already stale while we're here.
    pub fn put(&mut self, track_id: impl Into<String>, doc: AnalysisDocument) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.fetched_at.elapsed() <= ttl);
        self.entries.insert(
            track_id.into(),
            CacheEntry {
                fetched_at: Instant::now(),
                doc,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TimedInterval;

    fn doc_with_bars(n: usize) -> AnalysisDocument {
        AnalysisDocument {
            bars: (0..n)
                .map(|i| TimedInterval {
                    start: i as f64 * 2.0,
                    duration: 2.0,
                    confidence: 1.0,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn fresh_entry_hits() {
        let mut cache = AnalysisCache::new(Duration::from_secs(60));
        cache.put("t1", doc_with_bars(4));
        assert_eq!(cache.get("t1").unwrap().bars.len(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_ttl_entry_is_stale() {
        let mut cache = AnalysisCache::new(Duration::ZERO);
        cache.put("t1", doc_with_bars(4));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("t1").is_none());
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let mut cache = AnalysisCache::new(Duration::from_secs(60));
        cache.put("t1", doc_with_bars(2));
        cache.put("t1", doc_with_bars(8));
        assert_eq!(cache.get("t1").unwrap().bars.len(), 8);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_key_misses() {
        let cache = AnalysisCache::new(Duration::from_secs(60));
        assert!(cache.get("missing").is_none());
        assert!(cache.is_empty());
    }
}
