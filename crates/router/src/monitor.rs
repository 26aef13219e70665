//! Message monitor
//!
//! Per-outcome counters, latency histograms and client gauges. Everything is
//! observational: recording never blocks routing for longer than a short
//! histogram lock and never fails.

use crate::outcome::Outcome;
use crate::transport::Role;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Samples retained per histogram for the rolling summary
pub const DEFAULT_WINDOW: usize = 256;

/// Which latency a sample measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyChannel {
    /// Message origination timestamp to routing time
    Communication,
    /// Queueing plus write time of a persistence record
    Persistence,
}

impl LatencyChannel {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyChannel::Communication => "communication",
            LatencyChannel::Persistence => "persistence",
        }
    }
}

/// Rolling summary of a histogram window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistogramSummary {
    /// Samples ever recorded (not just the window)
    pub count: u64,
    /// Mean of the window in milliseconds
    pub mean: f64,
    /// Smallest sample in the window
    pub min: u64,
    /// Largest sample in the window
    pub max: u64,
    /// 95th percentile of the window
    pub p95: u64,
}

/// Bounded latency sample window
#[derive(Debug)]
pub struct Histogram {
    samples: Mutex<VecDeque<u64>>,
    window: usize,
    total: AtomicU64,
}

impl Histogram {
    /// Histogram keeping the last `window` samples
    pub fn new(window: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(window)),
            window: window.max(1),
            total: AtomicU64::new(0),
        }
    }

    /// Record a sample in milliseconds
    pub fn record(&self, ms: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(ms);
    }

    /// Summary over the current window
    pub fn summary(&self) -> HistogramSummary {
        let count = self.total.load(Ordering::Relaxed);
        let mut sorted: Vec<u64> = self
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        if sorted.is_empty() {
            return HistogramSummary {
                count,
                ..HistogramSummary::default()
            };
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
        let p95_index = ((sorted.len() * 95).div_ceil(100)).saturating_sub(1);
        HistogramSummary {
            count,
            mean: sum as f64 / sorted.len() as f64,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p95: sorted[p95_index.min(sorted.len() - 1)],
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Counters, latencies and gauges for the whole gateway
#[derive(Debug)]
pub struct MessageMonitor {
    counts: [AtomicU64; Outcome::COUNT],
    communication: Histogram,
    persistence: Histogram,
    clients: [AtomicU64; 3],
}

impl MessageMonitor {
    /// Zeroed monitor
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            communication: Histogram::default(),
            persistence: Histogram::default(),
            clients: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Count one message with `outcome`
    pub fn increment_count(&self, outcome: Outcome) {
        self.counts[outcome.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Messages counted with `outcome`
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.counts[outcome.index()].load(Ordering::Relaxed)
    }

    /// Messages counted across all outcomes
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Record a latency sample
    pub fn set_latency(&self, channel: LatencyChannel, ms: u64) {
        self.histogram(channel).record(ms);
    }

    /// Latency summary for `channel`
    pub fn latency(&self, channel: LatencyChannel) -> HistogramSummary {
        self.histogram(channel).summary()
    }

    fn histogram(&self, channel: LatencyChannel) -> &Histogram {
        match channel {
            LatencyChannel::Communication => &self.communication,
            LatencyChannel::Persistence => &self.persistence,
        }
    }

    fn role_slot(role: Role) -> usize {
        match role {
            Role::Node => 0,
            Role::Tasking => 1,
            Role::Operator => 2,
        }
    }

    /// Publish the live client count for `role`
    pub fn set_clients(&self, role: Role, count: usize) {
        self.clients[Self::role_slot(role)].store(count as u64, Ordering::Relaxed);
    }

    /// Last published client count for `role`
    pub fn clients(&self, role: Role) -> u64 {
        self.clients[Self::role_slot(role)].load(Ordering::Relaxed)
    }

    /// One-line summary of non-zero counters, gauges and latencies
    pub fn print(&self) -> String {
        let mut out = String::new();

        let _ = write!(out, "clients:");
        for role in Role::ALL {
            let _ = write!(out, " {}={}", role, self.clients(role));
        }

        let _ = write!(out, " | counts:");
        let mut any = false;
        for outcome in Outcome::ALL {
            let n = self.count(outcome);
            if n > 0 {
                any = true;
                let _ = write!(out, " {}={}", outcome, n);
            }
        }
        if !any {
            let _ = write!(out, " none");
        }

        for channel in [LatencyChannel::Communication, LatencyChannel::Persistence] {
            let s = self.latency(channel);
            let _ = write!(
                out,
                " | {} n={} mean={:.1}ms min={} max={} p95={}",
                channel.as_str(),
                s.count,
                s.mean,
                s.min,
                s.max,
                s.p95
            );
        }

        out
    }
}

impl Default for MessageMonitor {
    fn default() -> Self {
        Self::new()
    }
}
