//! The Stats Collector: renders the `statistics` endpoint and the
//! `namespace/<n>` tree endpoint from live counters and config.
//!
//! A flat walk over counters, each appended as a `key=value;` pair, with
//! derived ratios computed at render time rather than stored.

use crate::buf::DynBuf;
use crate::config::ConfigMutator;
use crate::sync::{Counter, LatencyHistogram, OpenCloseGauge};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters the ticker and the `statistics` endpoint both read.
/// Kept separate from `ConfigMutator` because these values are derived from
/// traffic, not configuration.
#[derive(Default)]
pub struct NodeStats {
    pub client_connections: OpenCloseGauge,
    pub fabric_connections: OpenCloseGauge,
    pub heartbeat_connections: OpenCloseGauge,
    pub info_complete: Counter,
    pub batch_index_complete: Counter,
    pub batch_index_error: Counter,
    pub early_tsvc_client_error: Counter,
    pub reaped_fds: Counter,
    /// Cumulative fabric bytes sent/received; the ticker turns the
    /// per-interval delta of these into a rate.
    pub fabric_bytes_sent: Counter,
    pub fabric_bytes_received: Counter,
    pub heartbeat_received: Counter,
    /// Per-request latency from frame arrival to reply write (spec.md §4.H
    /// step 7).
    pub info_latency: LatencyHistogram,
    /// Rates the ticker computes once per interval and publishes here
    /// (stored as bytes/sec * 1000, truncated to an integer so a plain
    /// atomic suffices); `statistics` reads these directly rather than
    /// recomputing them from raw counters.
    published_fabric_sent_rate_milli: AtomicU64,
    published_fabric_received_rate_milli: AtomicU64,
}

impl NodeStats {
    pub fn publish_fabric_rates(&self, sent_per_sec: f64, received_per_sec: f64) {
        self.published_fabric_sent_rate_milli.store((sent_per_sec * 1000.0) as u64, Ordering::Relaxed);
        self.published_fabric_received_rate_milli
            .store((received_per_sec * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn fabric_sent_rate(&self) -> f64 {
        self.published_fabric_sent_rate_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn fabric_received_rate(&self) -> f64 {
        self.published_fabric_received_rate_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// Renders the flat `statistics` endpoint body.
pub fn render_statistics(stats: &NodeStats, config: &ConfigMutator, out: &mut DynBuf) {
    out.append_pair_u64("client_connections", stats.client_connections.gauge());
    out.append_pair_u64("fabric_connections", stats.fabric_connections.gauge());
    out.append_pair_u64("heartbeat_connections", stats.heartbeat_connections.gauge());
    out.append_pair_u64("info_complete", stats.info_complete.get());
    out.append_pair_f64("info_latency_mean_us", stats.info_latency.mean_micros(), 1);
    out.append_pair_u64("batch_index_complete", stats.batch_index_complete.get());
    out.append_pair_u64("batch_index_error", stats.batch_index_error.get());
    out.append_pair_u64("early_tsvc_client_error", stats.early_tsvc_client_error.get());
    out.append_pair_u64("reaped_fds", stats.reaped_fds.get());
    out.append_pair_f64("fabric_bytes_sent_per_sec", stats.fabric_sent_rate(), 1);
    out.append_pair_f64("fabric_bytes_received_per_sec", stats.fabric_received_rate(), 1);
    out.append_pair_u64("ns_count", config.namespace_names().len() as u64);
    out.chomp(b';');
}

/// Per-namespace subtree stats used both by `namespace/<n>` and by each
/// namespace's line in the ticker frame. Grouped to match the ticker's
/// per-group ticker lines (spec.md §4.E): object counts, tombstones,
/// appeals, migration, memory/compression, persistent index, device,
/// per-origin transactions, duplicate resolution, retransmits,
/// re-replication, special errors.
#[derive(Default)]
pub struct NamespaceStats {
    pub objects: Counter,
    pub sub_objects: Counter,
    pub evicted_objects: Counter,
    pub expired_objects: Counter,
    pub comp_sz_total: Counter,
    pub orig_sz_total: Counter,
    pub tombstones: Counter,
    pub appeals_tx_active: Counter,
    pub appeals_rx_active: Counter,
    /// Partitions left to migrate out/in; `migrate_records_estimate` is the
    /// records-to-send estimate taken when migration for the round started,
    /// so the ratio against `migrate_records_transmitted` gives a monotonic
    /// percent-complete even as partitions finish at different rates.
    pub migrate_tx_partitions_remaining: Counter,
    pub migrate_rx_partitions_remaining: Counter,
    pub migrate_records_transmitted: Counter,
    pub migrate_records_estimate: Counter,
    pub pi_used_bytes: Counter,
    pub device_used_bytes: Counter,
    pub device_total_bytes: Counter,
    pub client_tsvc_ok: Counter,
    pub client_tsvc_error: Counter,
    pub from_proxy_tsvc_ok: Counter,
    pub from_proxy_tsvc_error: Counter,
    pub dup_res_ok: Counter,
    pub dup_res_error: Counter,
    pub retransmit_all: Counter,
    pub re_repl_success: Counter,
    pub re_repl_error: Counter,
    pub fail_key_busy: Counter,
    pub fail_generation: Counter,
    pub fail_record_too_big: Counter,
}

impl NamespaceStats {
    /// `avg_comp_sz` and `avg_orig_sz`'s ratio `comp_sz_total / orig_sz_total`
    /// reports `1.0` when nothing has been written yet rather than dividing
    /// by zero, matching the C collector's `(orig ? comp / orig : 1.0)` guard.
    pub fn compression_ratio(&self) -> f64 {
        let orig = self.orig_sz_total.get();
        if orig == 0 {
            1.0
        } else {
            self.comp_sz_total.get() as f64 / orig as f64
        }
    }

    /// Percent of the current migration round's estimated records already
    /// transmitted; `100.0` once nothing is left to estimate against
    /// (either no migration is running, or the round just started and
    /// hasn't recorded an estimate yet).
    pub fn migrate_progress_pct(&self) -> f64 {
        let estimate = self.migrate_records_estimate.get();
        if estimate == 0 {
            100.0
        } else {
            (self.migrate_records_transmitted.get() as f64 / estimate as f64) * 100.0
        }
    }

    pub fn is_migrating(&self) -> bool {
        self.migrate_tx_partitions_remaining.get() > 0 || self.migrate_rx_partitions_remaining.get() > 0
    }

    /// A namespace line is entirely suppressed from the ticker frame when
    /// every counter is zero except `objects` -- an empty
    /// namespace still reports its object count so operators can see it
    /// exists, but contributes no other noise to the frame.
    pub fn is_quiet(&self) -> bool {
        self.sub_objects.get() == 0
            && self.evicted_objects.get() == 0
            && self.expired_objects.get() == 0
            && self.comp_sz_total.get() == 0
            && self.orig_sz_total.get() == 0
            && self.tombstones.get() == 0
            && self.appeals_tx_active.get() == 0
            && self.appeals_rx_active.get() == 0
            && !self.is_migrating()
            && self.dup_res_ok.get() == 0
            && self.dup_res_error.get() == 0
            && self.retransmit_all.get() == 0
            && self.re_repl_success.get() == 0
            && self.re_repl_error.get() == 0
            && self.fail_key_busy.get() == 0
            && self.fail_generation.get() == 0
            && self.fail_record_too_big.get() == 0
    }
}

/// Renders the `namespace/<n>` tree endpoint body for one namespace's
/// memory-size config and live stats. `pending_quiesce` reflects
/// `quiesce`/`quiesce-undo`'s per-namespace flag (spec.md §8 scenario 4).
pub fn render_namespace(
    memory_size: u64,
    pending_quiesce: bool,
    stats: &NamespaceStats,
    out: &mut DynBuf,
) {
    out.append_pair_u64("memory-size", memory_size);
    out.append_pair_bool("pending_quiesce", pending_quiesce);
    out.append_pair_u64("objects", stats.objects.get());
    out.append_pair_u64("sub_objects", stats.sub_objects.get());
    out.append_pair_u64("evicted_objects", stats.evicted_objects.get());
    out.append_pair_u64("expired_objects", stats.expired_objects.get());
    out.append_pair_u64("tombstones", stats.tombstones.get());
    out.append_pair_f64("avg_comp_sz", stats.compression_ratio(), 3);
    out.append_pair_u64("device_total_bytes", stats.device_total_bytes.get());
    out.append_pair_u64("device_used_bytes", stats.device_used_bytes.get());
    out.chomp(b';');
}
