//! Upload identifier generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generates upload ids of the form `<unix-millis>-<counter>`.
///
/// The counter is strictly increasing for the lifetime of the generator, so
/// two calls landing in the same millisecond tick still produce distinct ids.
/// State is held on the generator itself rather than in a global, so tests
/// can construct a fresh one and get a deterministic counter sequence.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id. Never returns the same value twice.
    pub fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{}-{}", millis, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_pairwise_distinct() {
        let ids = IdGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(ids.next_id()));
        }
    }

    #[test]
    fn test_counter_suffix_is_strictly_increasing() {
        let ids = IdGenerator::new();
        let seq = |id: String| -> u64 { id.rsplit('-').next().unwrap().parse().unwrap() };
        let a = seq(ids.next_id());
        let b = seq(ids.next_id());
        let c = seq(ids.next_id());
        assert!(a < b && b < c);
    }

    #[test]
    fn test_fresh_generator_starts_at_zero() {
        let ids = IdGenerator::new();
        assert!(ids.next_id().ends_with("-0"));
        assert!(ids.next_id().ends_with("-1"));
    }
}
