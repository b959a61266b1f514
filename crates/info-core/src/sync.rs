//! Concurrency primitives for the Info plane's hot counters: individual
//! 64-bit atomics with explicit ordering and no silent word-tearing, rather
//! than a generic guard around arbitrary state -- a counter is just a
//! number, not a structure that needs locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// A relaxed monotonic counter. Readers and writers never need to
/// synchronize with each other through this value alone.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new(initial: u64) -> Counter {
        Counter(AtomicU64::new(initial))
    }

    #[inline]
    pub fn incr(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn add(&self, delta: u64) -> u64 {
        self.0.fetch_add(delta, Ordering::Relaxed) + delta
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// A paired opened/closed counter for a connection class. The published
/// gauge `opened - closed` must never go negative, which requires reading
/// `closed` strictly before `opened` at every observation site -- opening a
/// connection always increments `opened` second, after any bookkeeping that
/// might increment `closed` for a connection being replaced.
#[derive(Default)]
pub struct OpenCloseGauge {
    opened: Counter,
    closed: Counter,
}

impl OpenCloseGauge {
    pub fn new() -> OpenCloseGauge {
        OpenCloseGauge { opened: Counter::new(0), closed: Counter::new(0) }
    }

    pub fn record_open(&self) {
        self.opened.incr();
    }

    pub fn record_close(&self) {
        self.closed.incr();
    }

    /// Reads `closed` before `opened`, guaranteeing the gauge is never
    /// observed negative even under concurrent opens/closes.
    pub fn gauge(&self) -> u64 {
        let closed = self.closed.get();
        let opened = self.opened.get();
        opened.saturating_sub(closed)
    }

    pub fn opened(&self) -> u64 {
        self.opened.get()
    }

    pub fn closed(&self) -> u64 {
        self.closed.get()
    }
}

/// A primary value with a derived value that must be published so concurrent
/// lock-free readers of `primary()` never observe a torn combination: the
/// derived field is written first with `Release`, the primary last, also
/// with `Release`; readers load the primary with `Acquire` and may then load
/// the derived value knowing it is at least as new (e.g. max-write-cache
/// and its derived queue length).
pub struct PublishedPair {
    derived: AtomicU64,
    primary: AtomicU64,
}

impl PublishedPair {
    pub fn new(primary: u64, derived: u64) -> PublishedPair {
        PublishedPair { primary: AtomicU64::new(primary), derived: AtomicU64::new(derived) }
    }

    /// Writers must call this under the single config-set mutex; it is not
    /// safe to call concurrently with itself.
    pub fn publish(&self, primary: u64, derived: u64) {
        self.derived.store(derived, Ordering::Release);
        self.primary.store(primary, Ordering::Release);
    }

    pub fn read(&self) -> (u64, u64) {
        let primary = self.primary.load(Ordering::Acquire);
        let derived = self.derived.load(Ordering::Acquire);
        (primary, derived)
    }
}

/// A minimal stand-in for the per-bucket latency histograms the ticker
/// dumps: just the sample count, enough to express the "enabling/disabling
/// always clears it" state-machine rule without needing the real bucket
/// layout the storage/transaction layers would supply.
#[derive(Default)]
pub struct Histogram {
    samples: Counter,
}

impl Histogram {
    pub fn new() -> Histogram {
        Histogram::default()
    }

    pub fn record(&self) {
        self.samples.incr();
    }

    pub fn sample_count(&self) -> u64 {
        self.samples.get()
    }

    /// Resets the histogram to empty. Called on every enable/disable
    /// transition of a histogram-toggle config key, never while it's just
    /// sitting enabled or disabled.
    pub fn clear(&self) {
        self.samples.set(0);
    }
}

/// A minimal request-latency histogram: sample count plus a running
/// microsecond sum, enough to report a mean latency (spec.md §4.H step 7,
/// §3's "arrival timestamp is used only to record a latency histogram upon
/// completion") without the full per-bucket layout the storage/transaction
/// layers would supply for a percentile histogram.
#[derive(Default)]
pub struct LatencyHistogram {
    count: Counter,
    total_micros: Counter,
}

impl LatencyHistogram {
    pub fn new() -> LatencyHistogram {
        LatencyHistogram::default()
    }

    pub fn record(&self, elapsed: std::time::Duration) {
        self.count.incr();
        self.total_micros.add(elapsed.as_micros() as u64);
    }

    pub fn sample_count(&self) -> u64 {
        self.count.get()
    }

    pub fn mean_micros(&self) -> f64 {
        let n = self.count.get();
        if n == 0 {
            0.0
        } else {
            self.total_micros.get() as f64 / n as f64
        }
    }
}

#[cfg(test)]
mod latency_histogram_tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn mean_is_zero_with_no_samples() {
        let h = LatencyHistogram::new();
        assert_eq!(h.mean_micros(), 0.0);
    }

    #[test]
    fn mean_reflects_recorded_durations() {
        let h = LatencyHistogram::new();
        h.record(Duration::from_micros(100));
        h.record(Duration::from_micros(300));

        assert_eq!(h.sample_count(), 2);
        assert_eq!(h.mean_micros(), 200.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_never_goes_negative_when_closed_overtakes_opened_reads() {
        let g = OpenCloseGauge::new();
        g.record_open();
        g.record_open();
        g.record_close();
        g.record_close();
        g.record_close();

        assert_eq!(g.gauge(), 0);
    }

    #[test]
    fn gauge_reflects_net_open_connections() {
        let g = OpenCloseGauge::new();
        for _ in 0..5 {
            g.record_open();
        }
        for _ in 0..2 {
            g.record_close();
        }

        assert_eq!(g.gauge(), 3);
    }

    #[test]
    fn published_pair_round_trips() {
        let pair = PublishedPair::new(0, 0);
        pair.publish(100, 25);

        assert_eq!(pair.read(), (100, 25));
    }

    #[test]
    fn histogram_clear_resets_the_sample_count() {
        let h = Histogram::new();
        h.record();
        h.record();
        assert_eq!(h.sample_count(), 2);

        h.clear();
        assert_eq!(h.sample_count(), 0);
    }
}
