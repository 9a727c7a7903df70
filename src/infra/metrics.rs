//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total frames ever processed (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Sum of frame processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max frame processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Frame processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Commands received from the ingest boundary (monotonic)
    commands_received: AtomicU64,
    /// Commands dropped because the engine channel was full (monotonic)
    commands_dropped: AtomicU64,
    /// Crossing events recorded on counters (monotonic)
    crossings_recorded: AtomicU64,
    /// Spurious exits dropped by the counter clamp (monotonic)
    crossings_clamped: AtomicU64,
    /// Ticket outcome counters (monotonic)
    tickets_created: AtomicU64,
    tickets_checked: AtomicU64,
    tickets_escalated: AtomicU64,
    tickets_cancelled: AtomicU64,
    /// Snapshot egress messages dropped (channel full, monotonic)
    snapshots_dropped: AtomicU64,
    /// Time of last report, for rate computation
    last_report: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: Default::default(),
            commands_received: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            crossings_recorded: AtomicU64::new(0),
            crossings_clamped: AtomicU64::new(0),
            tickets_created: AtomicU64::new(0),
            tickets_checked: AtomicU64::new(0),
            tickets_escalated: AtomicU64::new(0),
            tickets_cancelled: AtomicU64::new(0),
            snapshots_dropped: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one processed frame and its processing latency
    pub fn record_frame_processed(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_received(&self) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crossing(&self) {
        self.crossings_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crossing_clamped(&self) {
        self.crossings_clamped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ticket_created(&self) {
        self.tickets_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ticket_checked(&self) {
        self.tickets_checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ticket_escalated(&self) {
        self.tickets_escalated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ticket_cancelled(&self) {
        self.tickets_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_dropped(&self) {
        self.snapshots_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Produce a summary, resetting the windowed counters
    ///
    /// `open_tickets` and `active_tracks` live in the engine and are passed
    /// in by the reporter.
    pub fn report(&self, open_tickets: usize, active_tracks: usize) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed.max(0.001)
        };

        let frames_window = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.latency_buckets);

        let avg_latency_us = if frames_window > 0 { latency_sum / frames_window } else { 0 };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec: frames_window as f64 / elapsed_secs,
            avg_latency_us,
            max_latency_us: latency_max,
            lat_buckets: buckets,
            lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&buckets, 0.99),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            crossings_recorded: self.crossings_recorded.load(Ordering::Relaxed),
            crossings_clamped: self.crossings_clamped.load(Ordering::Relaxed),
            tickets_created: self.tickets_created.load(Ordering::Relaxed),
            tickets_checked: self.tickets_checked.load(Ordering::Relaxed),
            tickets_escalated: self.tickets_escalated.load(Ordering::Relaxed),
            tickets_cancelled: self.tickets_cancelled.load(Ordering::Relaxed),
            snapshots_dropped: self.snapshots_dropped.load(Ordering::Relaxed),
            open_tickets,
            active_tracks,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time metrics summary
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub commands_received: u64,
    pub commands_dropped: u64,
    pub crossings_recorded: u64,
    pub crossings_clamped: u64,
    pub tickets_created: u64,
    pub tickets_checked: u64,
    pub tickets_escalated: u64,
    pub tickets_cancelled: u64,
    pub snapshots_dropped: u64,
    pub open_tickets: usize,
    pub active_tracks: usize,
}

impl MetricsSummary {
    /// Log the summary as a structured event
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_per_sec = %format!("{:.1}", self.frames_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p99_us = %self.lat_p99_us,
            commands_dropped = %self.commands_dropped,
            crossings = %self.crossings_recorded,
            tickets_created = %self.tickets_created,
            tickets_checked = %self.tickets_checked,
            tickets_escalated = %self.tickets_escalated,
            tickets_cancelled = %self.tickets_cancelled,
            open_tickets = %self.open_tickets,
            active_tracks = %self.active_tracks,
            "metrics_report"
        );
    }
}
