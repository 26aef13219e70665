//! Reconnection tolerance
//!
//! Remembers when each node was last heard from so that a node whose
//! connection dropped can keep reporting under its old NodeId for a while
//! without re-registering. Entries are never purged; expiry is judged when
//! the entry is read.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dataagent_protocol::NodeId;
use std::time::Duration;

/// NodeId → last-activity time
#[derive(Debug, Default)]
pub struct ReconnectionTracker {
    last_seen: DashMap<NodeId, DateTime<Utc>>,
}

impl ReconnectionTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity from `node_id` at `now`
    ///
    /// Upserts atomically. A timestamp older than the stored one is ignored.
    pub fn touch(&self, node_id: &str, now: DateTime<Utc>) {
        self.last_seen
            .entry(node_id.to_string())
            .and_modify(|seen| {
                if now > *seen {
                    *seen = now;
                }
            })
            .or_insert(now);
    }

    /// Whether `node_id` was touched within `timeout` of `now`
    pub fn is_recent(&self, node_id: &str, now: DateTime<Utc>, timeout: Duration) -> bool {
        let Some(seen) = self.last_seen(node_id) else {
            return false;
        };
        match now.signed_duration_since(seen).to_std() {
            Ok(elapsed) => elapsed <= timeout,
            // Touched after `now`: clock skew between callers, still recent
            Err(_) => true,
        }
    }

    /// Last recorded activity
    pub fn last_seen(&self, node_id: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(node_id).map(|seen| *seen)
    }

    /// Distinct NodeIds ever seen
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// True before any node has been seen
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_node_is_not_recent() {
        let tracker = ReconnectionTracker::new();
        assert!(!tracker.is_recent("NODE-A", Utc::now(), Duration::from_secs(60)));
    }

    #[test]
    fn test_window_boundaries() {
        let tracker = ReconnectionTracker::new();
        let t0 = Utc::now();
        tracker.touch("NODE-A", t0);

        let timeout = Duration::from_secs(30);
        assert!(tracker.is_recent("NODE-A", t0 + chrono::Duration::seconds(30), timeout));
        assert!(!tracker.is_recent("NODE-A", t0 + chrono::Duration::seconds(31), timeout));
    }

    #[test]
    fn test_touch_refreshes_and_never_rewinds() {
        let tracker = ReconnectionTracker::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);

        tracker.touch("NODE-A", t1);
        tracker.touch("NODE-A", t0);
        assert_eq!(tracker.last_seen("NODE-A"), Some(t1));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_entries_survive_expiry() {
        let tracker = ReconnectionTracker::new();
        let t0 = Utc::now();
        tracker.touch("NODE-A", t0);

        let later = t0 + chrono::Duration::hours(1);
        assert!(!tracker.is_recent("NODE-A", later, Duration::from_secs(60)));
        assert!(tracker.last_seen("NODE-A").is_some());
    }
}
