// =============================================================================
// dedup.rs — FIRST ONE IN WINS
// =============================================================================
//
// Row deduplication for the cleaner. Two layers:
//
// 1. A Bloom filter answers "definitely never seen" in O(k). Most rows in a
//    real table are unique, so most rows stop here.
//
// 2. When the Bloom filter says "maybe", an exact HashSet has the final
//    word. Bloom false positives are rescued here, so the engine never
//    drops a row that was not a true duplicate.
//
// Unlike a long-running stream deduplicator, a cleaning run sees a finite
// table, so nothing is ever evicted or rotated: the exact set holds every
// key for the lifetime of one run and is thrown away with the engine.
// =============================================================================

use std::collections::HashSet;

use bloomfilter::Bloom;
use serde::Serialize;
use tracing::{debug, info};

/// Deduplicates string keys for the lifetime of one cleaning run.
pub struct DedupEngine {
    bloom: Bloom<String>,
    seen: HashSet<String>,
    stats: DedupStats,
}

#[derive(Debug, Clone, Default)]
struct DedupStats {
    checks: u64,
    unique: u64,
    duplicates: u64,
    bloom_maybe_hits: u64,
}

impl DedupEngine {
    /// `expected_items` sizes the Bloom filter; pass the row count.
    pub fn new(expected_items: usize, fp_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        debug!(
            expected_items = expected_items,
            fp_rate = fp_rate,
            "Initializing deduplication engine"
        );

        Self {
            bloom: Bloom::new_for_fp_rate(expected_items, fp_rate),
            seen: HashSet::with_capacity(expected_items),
            stats: DedupStats::default(),
        }
    }

    /// Returns `true` if `key` is new (and remembers it), `false` if it is
    /// a duplicate of a key inserted earlier.
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        self.stats.checks += 1;
        let key = key.to_string();

        if self.bloom.check(&key) {
            self.stats.bloom_maybe_hits += 1;
            if self.seen.contains(&key) {
                self.stats.duplicates += 1;
                return false;
            }
            debug!("Bloom false positive rescued by exact set");
        }

        self.bloom.set(&key);
        self.seen.insert(key);
        self.stats.unique += 1;
        true
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        DedupSnapshot {
            total_checks: self.stats.checks,
            unique_items: self.stats.unique,
            duplicates_caught: self.stats.duplicates,
            bloom_false_positive_rescues: self.stats.bloom_maybe_hits - self.stats.duplicates,
        }
    }
}

impl Drop for DedupEngine {
    fn drop(&mut self) {
        if self.stats.checks > 0 {
            info!(
                checks = self.stats.checks,
                duplicates = self.stats.duplicates,
                "Deduplication engine retired"
            );
        }
    }
}

/// Counters from one dedup pass, carried into the cleaning report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupSnapshot {
    pub total_checks: u64,
    pub unique_items: u64,
    pub duplicates_caught: u64,
    pub bloom_false_positive_rescues: u64,
}
