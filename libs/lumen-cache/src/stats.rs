//! Aggregate cache statistics

use serde::{Deserialize, Serialize};

/// Point-in-time cache statistics.
///
/// `total_items` and `total_size` track the current contents;
/// `hit_count` and `miss_count` are monotonic over the cache lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries currently stored (including tag index entries).
    pub total_items: usize,
    /// Approximate byte size of keys plus serialized payloads.
    pub total_size: usize,
    /// Total reads served from the cache.
    pub hit_count: u64,
    /// Total reads that fell through (unknown, expired or corrupted).
    pub miss_count: u64,
}

impl CacheStats {
    /// Hit ratio over all reads so far, `0.0` when nothing was read.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            return 0.0;
        }
        self.hit_count as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio_empty() {
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            hit_count: 3,
            miss_count: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_ratio(), 0.75);
    }
}
