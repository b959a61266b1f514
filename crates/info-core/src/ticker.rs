//! The Ticker (spec.md §4.E): computes per-interval rates from cumulative
//! counters and renders a structured multi-line log frame.
//!
//! Grounded conceptually in `as/src/base/ticker.c` (the retrieved source
//! carried only its license header, so the frame layout below follows
//! spec.md §4.E directly) and, for the threading and shutdown-check shape,
//! the teacher's worker-loop style in `t51server/src/main.rs`.

use crate::config::ConfigMutator;
use crate::dispatch::pool::WorkerPool;
use crate::stats::{NamespaceStats, NodeStats};
use slog::{info, Logger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Node identity and cluster membership the ticker's identity/cluster-size
/// line needs (spec.md §4.E). The real clustering/heartbeat/exchange
/// subsystem is out of scope (spec.md §1); `SingleNodeView` stands in for
/// it with no peers and no skew.
pub trait ClusterView: Send + Sync {
    fn node_id(&self) -> String;
    fn cluster_size(&self) -> usize;
    /// Per-peer clock skew in milliseconds, keyed by peer node id. A peer
    /// is an outlier once its skew exceeds the ticker's own threshold.
    fn clock_skew_ms(&self) -> Vec<(String, i64)>;
}

pub struct SingleNodeView {
    node_id: String,
}

impl SingleNodeView {
    pub fn new(node_id: impl Into<String>) -> SingleNodeView {
        SingleNodeView { node_id: node_id.into() }
    }
}

impl ClusterView for SingleNodeView {
    fn node_id(&self) -> String {
        self.node_id.clone()
    }

    fn cluster_size(&self) -> usize {
        1
    }

    fn clock_skew_ms(&self) -> Vec<(String, i64)> {
        Vec::new()
    }
}

/// System-wide CPU/memory the ticker's `system` line reports. Sampling the
/// real OS counters is out of scope (spec.md §1); `NoSystemMetrics` reports
/// zero for both.
pub trait SystemMetrics: Send + Sync {
    fn cpu_pct(&self) -> f64;
    fn mem_used_bytes(&self) -> u64;
    fn mem_total_bytes(&self) -> u64;
}

pub struct NoSystemMetrics;

impl SystemMetrics for NoSystemMetrics {
    fn cpu_pct(&self) -> f64 {
        0.0
    }

    fn mem_used_bytes(&self) -> u64 {
        0
    }

    fn mem_total_bytes(&self) -> u64 {
        0
    }
}

/// This process's own CPU/heap/thread counts the ticker's `process` line
/// reports. Out of scope for the same reason as `SystemMetrics`.
pub trait ProcessMetrics: Send + Sync {
    fn cpu_pct(&self) -> f64;
    fn heap_bytes(&self) -> u64;
    fn thread_count(&self) -> u64;
}

pub struct NoProcessMetrics;

impl ProcessMetrics for NoProcessMetrics {
    fn cpu_pct(&self) -> f64 {
        0.0
    }

    fn heap_bytes(&self) -> u64 {
        0
    }

    fn thread_count(&self) -> u64 {
        0
    }
}

/// In-progress queue depths the ticker's `in-progress` line reports, named
/// rather than a single number since a real node tracks several (read,
/// write, info, fabric...); this workspace only has the Info worker pool in
/// scope, so `PoolQueueDepths` is the one real implementation.
pub trait QueueDepths: Send + Sync {
    fn depths(&self) -> Vec<(&'static str, usize)>;
}

pub struct NoQueueDepths;

impl QueueDepths for NoQueueDepths {
    fn depths(&self) -> Vec<(&'static str, usize)> {
        Vec::new()
    }
}

/// Reports the Info worker pool's active thread count as its one tracked
/// queue depth; the storage/transaction-layer queues spec.md §4.E also
/// names (read, write, ...) are out of scope (spec.md §1).
pub struct PoolQueueDepths {
    pool: Arc<WorkerPool>,
}

impl PoolQueueDepths {
    pub fn new(pool: Arc<WorkerPool>) -> PoolQueueDepths {
        PoolQueueDepths { pool }
    }
}

impl QueueDepths for PoolQueueDepths {
    fn depths(&self) -> Vec<(&'static str, usize)> {
        vec![("info", self.pool.active_count())]
    }
}

/// A peer clock skew beyond this many milliseconds is called out by name in
/// the `clock-skew` line's outlier list rather than folded silently into the
/// average.
const CLOCK_SKEW_OUTLIER_THRESHOLD_MS: i64 = 5_000;

/// Snapshot of a monotonic counter taken on the previous tick, used to
/// compute this interval's rate.
#[derive(Default, Clone, Copy)]
struct RateSample {
    value: u64,
    at: Option<Instant>,
}

/// Tracks the previous reading of every rate-reported counter across ticks.
/// A fresh `Ticker` has no prior sample, so the first tick after startup
/// reports a rate of zero rather than a spurious spike from `0` to the
/// counter's already-accumulated value.
#[derive(Default)]
struct RateTracker {
    samples: HashMap<&'static str, RateSample>,
}

impl RateTracker {
    /// Computes `delta / elapsed_seconds`, flooring `elapsed_seconds` to `1`
    /// so a tick firing faster than a second (under test, or a very short
    /// configured interval) never divides by a sub-one duration and inflates
    /// the rate.
    fn rate(&mut self, name: &'static str, current: u64, now: Instant) -> f64 {
        let previous = self.samples.insert(name, RateSample { value: current, at: Some(now) });

        match previous {
            Some(RateSample { value, at: Some(at) }) => {
                let elapsed = now.saturating_duration_since(at).as_secs().max(1);
                let delta = current.saturating_sub(value);
                delta as f64 / elapsed as f64
            }
            _ => 0.0,
        }
    }
}

/// A named, shared counter accessible by namespace for the per-namespace
/// ticker section. The server wires this up from its namespace table.
pub struct NamespaceEntry {
    pub name: String,
    pub memory_size: u64,
    pub stats: Arc<NamespaceStats>,
}

pub struct Ticker {
    logger: Logger,
    stats: Arc<NodeStats>,
    config: Arc<ConfigMutator>,
    namespaces: Vec<NamespaceEntry>,
    shutdown: Arc<AtomicBool>,
    rates: RateTracker,
    cluster: Arc<dyn ClusterView>,
    system: Arc<dyn SystemMetrics>,
    process: Arc<dyn ProcessMetrics>,
    queues: Arc<dyn QueueDepths>,
}

impl Ticker {
    pub fn new(
        logger: Logger,
        stats: Arc<NodeStats>,
        config: Arc<ConfigMutator>,
        namespaces: Vec<NamespaceEntry>,
        shutdown: Arc<AtomicBool>,
        cluster: Arc<dyn ClusterView>,
        system: Arc<dyn SystemMetrics>,
        process: Arc<dyn ProcessMetrics>,
        queues: Arc<dyn QueueDepths>,
    ) -> Ticker {
        Ticker {
            logger,
            stats,
            config,
            namespaces,
            shutdown,
            rates: RateTracker::default(),
            cluster,
            system,
            process,
            queues,
        }
    }

    /// Runs the tick loop on the calling thread until `shutdown` is set,
    /// sleeping for `ticker-interval` seconds (re-read every iteration, so a
    /// live `config-set` takes effect on the next tick) between frames.
    ///
    /// Checks `shutdown` once more immediately before emitting a frame: a
    /// shutdown that lands mid-sleep must not produce a final partial frame
    /// built from a half-torn snapshot of counters.
    pub fn run(mut self) {
        loop {
            let interval = self.config.service.ticker_interval.load(Ordering::Relaxed).max(1);
            std::thread::sleep(Duration::from_secs(interval as u64));

            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }

            self.emit_frame();
        }
    }

    fn emit_frame(&mut self) {
        let now = Instant::now();

        self.emit_identity_line();
        self.emit_clock_skew_line();
        self.emit_system_line();
        self.emit_process_line();
        self.emit_in_progress_line();
        self.emit_node_stats_line(now);
        self.emit_early_failures_line();
        self.emit_batch_index_line(now);
        self.emit_microbenchmarks_line();

        for i in 0..self.namespaces.len() {
            self.emit_namespace_lines(i);
        }
    }

    fn emit_identity_line(&self) {
        info!(
            self.logger, "node-identity";
            "node_id" => self.cluster.node_id(),
            "cluster_size" => self.cluster.cluster_size(),
        );
    }

    /// The skew line always reports how many peers were sampled; the
    /// outlier list is only non-empty when at least one peer's skew passed
    /// `CLOCK_SKEW_OUTLIER_THRESHOLD_MS`.
    fn emit_clock_skew_line(&self) {
        let skews = self.cluster.clock_skew_ms();
        let outliers: Vec<String> = skews
            .iter()
            .filter(|(_, skew)| skew.abs() >= CLOCK_SKEW_OUTLIER_THRESHOLD_MS)
            .map(|(id, skew)| format!("{}={}ms", id, skew))
            .collect();

        info!(
            self.logger, "clock-skew";
            "peers_sampled" => skews.len(),
            "outliers" => outliers.join(","),
        );
    }

    fn emit_system_line(&self) {
        info!(
            self.logger, "system";
            "cpu_pct" => format!("{:.1}", self.system.cpu_pct()),
            "mem_used_bytes" => self.system.mem_used_bytes(),
            "mem_total_bytes" => self.system.mem_total_bytes(),
        );
    }

    fn emit_process_line(&self) {
        info!(
            self.logger, "process";
            "cpu_pct" => format!("{:.1}", self.process.cpu_pct()),
            "heap_bytes" => self.process.heap_bytes(),
            "thread_count" => self.process.thread_count(),
        );
    }

    fn emit_in_progress_line(&self) {
        let mut buf = crate::buf::DynBuf::new();
        for (name, depth) in self.queues.depths() {
            buf.append_pair_u64(name, depth as u64);
        }
        buf.chomp(b';');
        let line = String::from_utf8_lossy(buf.as_slice()).into_owned();

        info!(self.logger, "in-progress"; "queues" => line);
    }

    fn emit_node_stats_line(&mut self, now: Instant) {
        let client_conns = self.stats.client_connections.gauge();
        let fabric_conns = self.stats.fabric_connections.gauge();
        let heartbeat_conns = self.stats.heartbeat_connections.gauge();

        let info_rate = self.rates.rate("info_complete", self.stats.info_complete.get(), now);
        let fabric_sent_rate =
            self.rates.rate("fabric_bytes_sent", self.stats.fabric_bytes_sent.get(), now);
        let fabric_recv_rate =
            self.rates.rate("fabric_bytes_received", self.stats.fabric_bytes_received.get(), now);
        self.stats.publish_fabric_rates(fabric_sent_rate, fabric_recv_rate);

        info!(
            self.logger, "node-stats";
            "client_connections" => client_conns,
            "fabric_connections" => fabric_conns,
            "heartbeat_connections" => heartbeat_conns,
            "info_complete_per_sec" => format!("{:.1}", info_rate),
            "info_latency_mean_us" => format!("{:.1}", self.stats.info_latency.mean_micros()),
            "fabric_bytes_sent_per_sec" => format!("{:.1}", fabric_sent_rate),
            "fabric_bytes_received_per_sec" => format!("{:.1}", fabric_recv_rate),
            "heartbeat_received" => self.stats.heartbeat_received.get(),
        );
    }

    // Early-failure and batch-index lines are suppressed entirely when
    // zero, per spec.md §4.E, rather than printed as noise every tick.
    fn emit_early_failures_line(&self) {
        let early_failures = self.stats.early_tsvc_client_error.get();
        if early_failures > 0 {
            info!(self.logger, "early-failures"; "early_tsvc_client_error" => early_failures);
        }
    }

    fn emit_batch_index_line(&mut self, now: Instant) {
        let batch_complete = self.stats.batch_index_complete.get();
        let batch_errors = self.stats.batch_index_error.get();
        let batch_rate =
            self.rates.rate("batch_index_complete", self.stats.batch_index_complete.get(), now);

        if batch_complete > 0 || batch_errors > 0 {
            info!(
                self.logger, "batch-index";
                "complete" => batch_complete,
                "complete_per_sec" => format!("{:.1}", batch_rate),
                "error" => batch_errors,
            );
        }
    }

    fn emit_microbenchmarks_line(&self) {
        if self.config.service.microbenchmarks_histogram_enabled.load(Ordering::Relaxed) {
            info!(
                self.logger, "microbenchmarks-histogram";
                "samples" => self.config.service.microbenchmarks_histogram.sample_count(),
            );
        }
    }

    /// One namespace's section: `objects` is always emitted (spec.md
    /// §4.E), then one additional line per non-empty group (tombstones,
    /// appeals, migration, memory/compression, persistent index, device,
    /// transactions, duplicate resolution, retransmits, re-replication,
    /// special errors), each suppressed when its own counters are all zero
    /// rather than folded into a single noisy line.
    fn emit_namespace_lines(&self, index: usize) {
        let ns = &self.namespaces[index];
        let stats = &ns.stats;
        let name = ns.name.as_str();

        info!(self.logger, "namespace-objects"; "ns" => name, "objects" => stats.objects.get());

        if stats.tombstones.get() > 0 {
            info!(self.logger, "namespace-tombstones"; "ns" => name, "tombstones" => stats.tombstones.get());
        }

        if stats.evicted_objects.get() > 0 || stats.expired_objects.get() > 0 {
            info!(
                self.logger, "namespace-evictions";
                "ns" => name,
                "evicted_objects" => stats.evicted_objects.get(),
                "expired_objects" => stats.expired_objects.get(),
            );
        }

        if stats.appeals_tx_active.get() > 0 || stats.appeals_rx_active.get() > 0 {
            info!(
                self.logger, "namespace-appeals";
                "ns" => name,
                "tx_active" => stats.appeals_tx_active.get(),
                "rx_active" => stats.appeals_rx_active.get(),
            );
        }

        if stats.is_migrating() {
            info!(
                self.logger, "namespace-migrations";
                "ns" => name,
                "tx_partitions_remaining" => stats.migrate_tx_partitions_remaining.get(),
                "rx_partitions_remaining" => stats.migrate_rx_partitions_remaining.get(),
                "pct_complete" => format!("{:.1}", stats.migrate_progress_pct()),
            );
        }

        if stats.sub_objects.get() > 0 || stats.comp_sz_total.get() > 0 || stats.orig_sz_total.get() > 0 {
            info!(
                self.logger, "namespace-memory";
                "ns" => name,
                "memory_size" => ns.memory_size,
                "sub_objects" => stats.sub_objects.get(),
                "avg_comp_sz" => format!("{:.3}", stats.compression_ratio()),
            );
        }

        if stats.pi_used_bytes.get() > 0 {
            info!(self.logger, "namespace-persistent-index"; "ns" => name, "pi_used_bytes" => stats.pi_used_bytes.get());
        }

        if stats.device_total_bytes.get() > 0 || stats.device_used_bytes.get() > 0 {
            info!(
                self.logger, "namespace-device";
                "ns" => name,
                "device_used_bytes" => stats.device_used_bytes.get(),
                "device_total_bytes" => stats.device_total_bytes.get(),
            );
        }

        if stats.client_tsvc_ok.get() > 0
            || stats.client_tsvc_error.get() > 0
            || stats.from_proxy_tsvc_ok.get() > 0
            || stats.from_proxy_tsvc_error.get() > 0
        {
            info!(
                self.logger, "namespace-transactions";
                "ns" => name,
                "client_ok" => stats.client_tsvc_ok.get(),
                "client_error" => stats.client_tsvc_error.get(),
                "from_proxy_ok" => stats.from_proxy_tsvc_ok.get(),
                "from_proxy_error" => stats.from_proxy_tsvc_error.get(),
            );
        }

        if stats.dup_res_ok.get() > 0 || stats.dup_res_error.get() > 0 {
            info!(
                self.logger, "namespace-dup-res";
                "ns" => name,
                "ok" => stats.dup_res_ok.get(),
                "error" => stats.dup_res_error.get(),
            );
        }

        if stats.retransmit_all.get() > 0 {
            info!(self.logger, "namespace-retransmits"; "ns" => name, "all" => stats.retransmit_all.get());
        }

        if stats.re_repl_success.get() > 0 || stats.re_repl_error.get() > 0 {
            info!(
                self.logger, "namespace-re-replication";
                "ns" => name,
                "success" => stats.re_repl_success.get(),
                "error" => stats.re_repl_error.get(),
            );
        }

        if stats.fail_key_busy.get() > 0 || stats.fail_generation.get() > 0 || stats.fail_record_too_big.get() > 0 {
            info!(
                self.logger, "namespace-special-errors";
                "ns" => name,
                "key_busy" => stats.fail_key_busy.get(),
                "generation" => stats.fail_generation.get(),
                "record_too_big" => stats.fail_record_too_big.get(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_zero_on_first_observation() {
        let mut tracker = RateTracker::default();
        let now = Instant::now();
        assert_eq!(tracker.rate("x", 1000, now), 0.0);
    }

    #[test]
    fn rate_floors_elapsed_seconds_to_one() {
        let mut tracker = RateTracker::default();
        let t0 = Instant::now();
        tracker.rate("x", 100, t0);
        let rate = tracker.rate("x", 150, t0);
        assert_eq!(rate, 50.0);
    }

    fn test_ticker(stats: Arc<NodeStats>, namespaces: Vec<NamespaceEntry>) -> Ticker {
        let logger = Logger::root(slog::Discard, slog::o!());
        let config = Arc::new(ConfigMutator::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        Ticker::new(
            logger,
            stats,
            config,
            namespaces,
            shutdown,
            Arc::new(SingleNodeView::new("test-node")),
            Arc::new(NoSystemMetrics),
            Arc::new(NoProcessMetrics),
            Arc::new(NoQueueDepths),
        )
    }

    #[test]
    fn emit_frame_publishes_fabric_rates_onto_node_stats() {
        let stats = Arc::new(NodeStats::default());
        let mut ticker = test_ticker(stats.clone(), Vec::new());

        // First frame only seeds the rate tracker's baseline (no prior
        // sample), so the published rate should still read zero.
        stats.fabric_bytes_sent.add(1000);
        ticker.emit_frame();
        assert_eq!(stats.fabric_sent_rate(), 0.0);
    }

    #[test]
    fn single_node_view_reports_no_peers() {
        let view = SingleNodeView::new("n1");
        assert_eq!(view.cluster_size(), 1);
        assert!(view.clock_skew_ms().is_empty());
    }

    #[test]
    fn pool_queue_depths_reports_active_count() {
        let pool = Arc::new(WorkerPool::new(1, 2, 4));
        let depths = PoolQueueDepths::new(pool);
        assert_eq!(depths.depths(), vec![("info", 1)]);
    }

    #[test]
    fn emit_frame_does_not_panic_with_a_non_quiet_namespace() {
        let stats = Arc::new(NodeStats::default());
        let ns_stats = Arc::new(NamespaceStats::default());
        ns_stats.objects.add(5);
        ns_stats.tombstones.add(1);
        ns_stats.migrate_tx_partitions_remaining.add(2);
        ns_stats.migrate_records_estimate.add(10);
        ns_stats.migrate_records_transmitted.add(3);

        let namespaces = vec![NamespaceEntry { name: "test".to_string(), memory_size: 1024, stats: ns_stats }];
        let mut ticker = test_ticker(stats, namespaces);
        ticker.emit_frame();
    }
}
