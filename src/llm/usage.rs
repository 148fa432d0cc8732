use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::router::BackendTier;

#[derive(Default)]
struct TierCounters {
    calls: AtomicU64,
    failures: AtomicU64,
}

/// Per-tier call counters for one scan. Shared between workers.
#[derive(Default)]
pub struct UsageTracker {
    inexpensive: TierCounters,
    balanced: TierCounters,
    capable: TierCounters,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TierUsage {
    pub calls: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct UsageSummary {
    pub inexpensive: TierUsage,
    pub balanced: TierUsage,
    pub capable: TierUsage,
}

impl UsageSummary {
    pub fn total_calls(&self) -> u64 {
        self.inexpensive.calls + self.balanced.calls + self.capable.calls
    }
}

impl UsageTracker {
    fn counters(&self, tier: BackendTier) -> &TierCounters {
        match tier {
            BackendTier::Inexpensive => &self.inexpensive,
            BackendTier::Balanced => &self.balanced,
            BackendTier::Capable => &self.capable,
        }
    }

    pub fn record(&self, tier: BackendTier, success: bool) {
        let counters = self.counters(tier);
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> UsageSummary {
        let read = |c: &TierCounters| TierUsage {
            calls: c.calls.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        };
        UsageSummary {
            inexpensive: read(&self.inexpensive),
            balanced: read(&self.balanced),
            capable: read(&self.capable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let tracker = UsageTracker::default();
        tracker.record(BackendTier::Inexpensive, true);
        tracker.record(BackendTier::Capable, true);
        tracker.record(BackendTier::Capable, false);
        let summary = tracker.snapshot();
        assert_eq!(summary.inexpensive, TierUsage { calls: 1, failures: 0 });
        assert_eq!(summary.capable, TierUsage { calls: 2, failures: 1 });
        assert_eq!(summary.total_calls(), 3);
    }
}
