use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LATENCY_WINDOW: usize = 1000;

/// Handling latencies of the most recent batches, in nanoseconds.
/// Clones share the same window.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<u64>>>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, nanos: u64) {
        let mut samples = self.samples.lock();
        while samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    /// Nearest-rank percentile in microseconds; zero while the window is empty
    pub fn percentile_us(&self, p: f64) -> f64 {
        let mut sorted: Vec<u64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_unstable();
        let rank = (sorted.len() as f64 * p.clamp(0.0, 1.0)).ceil() as usize;
        sorted[rank.saturating_sub(1)] as f64 / 1_000.0
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-stage protocol counters. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Batches handed to the stage while it was live
    batches_received: Arc<AtomicU64>,
    /// Items posted downstream
    items_posted: Arc<AtomicU64>,
    /// Items reported to the host as dropped
    items_dropped: Arc<AtomicU64>,
    /// `request_next` calls issued
    next_requests: Arc<AtomicU64>,
    /// Inbound obligations fulfilled
    obligations_fulfilled: Arc<AtomicU64>,
    /// Conditions reported through `notify_error` or propagated
    errors: Arc<AtomicU64>,
    /// Batch handling latency
    latency: LatencyWindow,
    start_time: Instant,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            batches_received: Arc::new(AtomicU64::new(0)),
            items_posted: Arc::new(AtomicU64::new(0)),
            items_dropped: Arc::new(AtomicU64::new(0)),
            next_requests: Arc::new(AtomicU64::new(0)),
            obligations_fulfilled: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            latency: LatencyWindow::new(LATENCY_WINDOW),
            start_time: Instant::now(),
        }
    }

    pub fn record_batch(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_posted(&self, items: usize) {
        self.items_posted.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, items: usize) {
        self.items_dropped.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.next_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fulfilled(&self) {
        self.obligations_fulfilled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a latency measurement in nanoseconds
    pub fn record_latency(&self, nanos: u64) {
        self.latency.record(nanos);
    }

    pub fn total_batches(&self) -> u64 {
        self.batches_received.load(Ordering::Relaxed)
    }

    pub fn total_posted(&self) -> u64 {
        self.items_posted.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.items_dropped.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.next_requests.load(Ordering::Relaxed)
    }

    pub fn total_fulfilled(&self) -> u64 {
        self.obligations_fulfilled.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Batches handled per second since creation
    pub fn throughput_bps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_batches() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_batches: self.total_batches(),
            total_posted: self.total_posted(),
            total_dropped: self.total_dropped(),
            total_requests: self.total_requests(),
            total_fulfilled: self.total_fulfilled(),
            total_errors: self.total_errors(),
            throughput_bps: self.throughput_bps(),
            latency_p50_us: self.latency.percentile_us(0.50),
            latency_p99_us: self.latency.percentile_us(0.99),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_batches: u64,
    pub total_posted: u64,
    pub total_dropped: u64,
    pub total_requests: u64,
    pub total_fulfilled: u64,
    pub total_errors: u64,
    pub throughput_bps: f64,
    pub latency_p50_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Batches: {}, Posted: {}, Dropped: {}, Requests: {}, Acked: {}, Errors: {}, \
             Throughput: {:.2} batch/s, Latency P50: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.total_batches,
            self.total_posted,
            self.total_dropped,
            self.total_requests,
            self.total_fulfilled,
            self.total_errors,
            self.throughput_bps,
            self.latency_p50_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rank_percentiles() {
        let window = LatencyWindow::new(10);
        assert_eq!(window.percentile_us(0.5), 0.0);
        for i in 1..=10 {
            window.record(i * 1000);
        }
        assert_eq!(window.percentile_us(0.5), 5.0);
        assert_eq!(window.percentile_us(0.99), 10.0);
    }

    #[test]
    fn test_window_keeps_latest_samples() {
        let window = LatencyWindow::new(3);
        for i in 1..=10 {
            window.record(i * 1000);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.percentile_us(0.0), 8.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = StageMetrics::new();
        let clone = metrics.clone();
        clone.record_batch();
        clone.record_dropped(3);
        metrics.record_request();
        assert_eq!(metrics.total_batches(), 1);
        assert_eq!(metrics.total_dropped(), 3);
        assert_eq!(clone.total_requests(), 1);
        assert!(metrics.snapshot().format().contains("Dropped: 3"));
    }
}
