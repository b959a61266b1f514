//! `context=service` keys: process-wide knobs with no namespace scope.
//! Grounded in the `service` block of `thr_info.c`'s config-set switch
//! (`proto-fd-max`, `paxos-recovery-policy`, and friends).

use super::ConfigKey;
use crate::buf::DynBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::sync::{Counter, Histogram};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Service-context state. Every field is a bare atomic: readers (the
/// dispatcher, the ticker, any handler) load it directly with no lock,
/// per the single-global-write-lock contract in `super::ConfigMutator`.
pub struct ServiceConfig {
    pub proto_fd_max: AtomicU32,
    pub ticker_interval: AtomicU32,
    pub migrate_threads: AtomicU32,
    pub batch_index_threads: AtomicU32,
    pub query_threads_limit: AtomicU32,
    /// The configured Info worker pool size (spec.md §4.H). A successful
    /// `config-set` of this key is read back by `info-server`'s dispatcher,
    /// which resizes the live `WorkerPool` to match -- `ConfigKey::apply`
    /// only publishes the target here, since a `ConfigKey<ServiceConfig>`
    /// has no reference to the pool itself.
    pub info_threads: AtomicU32,
    pub downgrading: AtomicBool,
    pub generation: Counter,
    /// Benchmark-histogram enablement (spec.md §4.D's state-machine-like
    /// keys): flipping this in either direction always clears
    /// `microbenchmarks_histogram` so a presented histogram is never a
    /// stale partial aggregate from a previous enablement.
    pub microbenchmarks_histogram_enabled: AtomicBool,
    pub microbenchmarks_histogram: Histogram,
}

impl ServiceConfig {
    pub fn with_info_threads(info_threads: u32) -> ServiceConfig {
        ServiceConfig { info_threads: AtomicU32::new(info_threads), ..ServiceConfig::default() }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            proto_fd_max: AtomicU32::new(15000),
            ticker_interval: AtomicU32::new(10),
            migrate_threads: AtomicU32::new(1),
            batch_index_threads: AtomicU32::new(4),
            query_threads_limit: AtomicU32::new(8),
            info_threads: AtomicU32::new(8),
            downgrading: AtomicBool::new(false),
            generation: Counter::new(0),
            microbenchmarks_histogram_enabled: AtomicBool::new(false),
            microbenchmarks_histogram: Histogram::new(),
        }
    }
}

fn parse_u32(value: &str, name: &str) -> Result<u32> {
    value.parse().map_err(|_| Error::new(ErrorKind::BadParam, format!("'{}' must be an integer", name)))
}

fn parse_bool(value: &str, name: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::new(ErrorKind::BadParam, format!("'{}' must be true or false", name))),
    }
}

struct ProtoFdMax;
impl ConfigKey<ServiceConfig> for ProtoFdMax {
    fn name(&self) -> &'static str {
        "proto-fd-max"
    }
    fn validate(&self, _state: &ServiceConfig, value: &str) -> Result<()> {
        let v = parse_u32(value, self.name())?;
        if v == 0 {
            return Err(Error::new(ErrorKind::BadParam, "'proto-fd-max' must be positive"));
        }
        Ok(())
    }
    fn apply(&self, state: &ServiceConfig, value: &str) {
        state.proto_fd_max.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &ServiceConfig, out: &mut DynBuf) {
        out.append_u64(state.proto_fd_max.load(Ordering::Relaxed) as u64);
    }
}

struct TickerInterval;
impl ConfigKey<ServiceConfig> for TickerInterval {
    fn name(&self) -> &'static str {
        "ticker-interval"
    }
    fn validate(&self, _state: &ServiceConfig, value: &str) -> Result<()> {
        let v = parse_u32(value, self.name())?;
        if v == 0 {
            return Err(Error::new(ErrorKind::BadParam, "'ticker-interval' must be positive"));
        }
        Ok(())
    }
    fn apply(&self, state: &ServiceConfig, value: &str) {
        state.ticker_interval.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &ServiceConfig, out: &mut DynBuf) {
        out.append_u64(state.ticker_interval.load(Ordering::Relaxed) as u64);
    }
}

/// Thread-count keys must stay within a sane band: raising them without
/// bound starves the CPU the worker pool shares with the rest of the node.
struct ThreadCountKey {
    key: &'static str,
    max: u32,
    field: fn(&ServiceConfig) -> &AtomicU32,
}

impl ConfigKey<ServiceConfig> for ThreadCountKey {
    fn name(&self) -> &'static str {
        self.key
    }
    fn validate(&self, _state: &ServiceConfig, value: &str) -> Result<()> {
        let v = parse_u32(value, self.key)?;
        if v == 0 || v > self.max {
            return Err(Error::new(
                ErrorKind::BadParam,
                format!("'{}' must be between 1 and {}", self.key, self.max),
            ));
        }
        Ok(())
    }
    fn apply(&self, state: &ServiceConfig, value: &str) {
        (self.field)(state).store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &ServiceConfig, out: &mut DynBuf) {
        out.append_u64((self.field)(state).load(Ordering::Relaxed) as u64);
    }
}

struct Downgrading;
impl ConfigKey<ServiceConfig> for Downgrading {
    fn name(&self) -> &'static str {
        "downgrading"
    }
    /// Once set, downgrading cannot be cleared without a restart: a node
    /// that has started writing the downlevel wire format can't silently
    /// promise to stop.
    fn validate(&self, state: &ServiceConfig, value: &str) -> Result<()> {
        let v = parse_bool(value, self.name())?;
        if state.downgrading.load(Ordering::Relaxed) && !v {
            return Err(Error::new(ErrorKind::Conflict, "'downgrading' cannot be cleared at runtime"));
        }
        Ok(())
    }
    fn apply(&self, state: &ServiceConfig, value: &str) {
        state.downgrading.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &ServiceConfig, out: &mut DynBuf) {
        out.append_bool(state.downgrading.load(Ordering::Relaxed));
    }
}

/// Enabling from disabled clears the histogram first; disabling always
/// clears it after flipping the flag -- either transition leaves the
/// histogram empty, per spec.md §4.D. Re-setting the same value is a no-op
/// that leaves existing samples alone (it isn't a transition).
struct MicrobenchmarksHistogram;
impl ConfigKey<ServiceConfig> for MicrobenchmarksHistogram {
    fn name(&self) -> &'static str {
        "microbenchmarks-histogram"
    }
    fn validate(&self, _state: &ServiceConfig, value: &str) -> Result<()> {
        parse_bool(value, self.name()).map(|_| ())
    }
    fn apply(&self, state: &ServiceConfig, value: &str) {
        let enable = value == "true";
        let was_enabled = state.microbenchmarks_histogram_enabled.swap(enable, Ordering::Relaxed);
        if enable != was_enabled {
            state.microbenchmarks_histogram.clear();
        }
    }
    fn describe(&self, state: &ServiceConfig, out: &mut DynBuf) {
        out.append_bool(state.microbenchmarks_histogram_enabled.load(Ordering::Relaxed));
    }
}

pub(super) fn keys() -> Vec<Box<dyn ConfigKey<ServiceConfig>>> {
    vec![
        Box::new(ProtoFdMax),
        Box::new(TickerInterval),
        Box::new(MicrobenchmarksHistogram),
        Box::new(ThreadCountKey {
            key: "migrate-threads",
            max: 100,
            field: |s| &s.migrate_threads,
        }),
        Box::new(ThreadCountKey {
            key: "batch-index-threads",
            max: 256,
            field: |s| &s.batch_index_threads,
        }),
        Box::new(ThreadCountKey {
            key: "query-threads-limit",
            max: 1024,
            field: |s| &s.query_threads_limit,
        }),
        Box::new(ThreadCountKey {
            key: "info-threads",
            max: 128,
            field: |s| &s.info_threads,
        }),
        Box::new(Downgrading),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::ConfigMutator;

    #[test]
    fn proto_fd_max_rejects_zero() {
        let m = ConfigMutator::new(false);
        assert!(m.set("context=service;proto-fd-max=0").is_err());
    }

    #[test]
    fn thread_count_rejects_values_past_the_ceiling() {
        let m = ConfigMutator::new(false);
        assert!(m.set("context=service;migrate-threads=500").is_err());
    }

    #[test]
    fn downgrading_cannot_be_cleared_once_set() {
        let m = ConfigMutator::new(false);
        m.set("context=service;downgrading=true").unwrap();
        assert!(m.set("context=service;downgrading=false").is_err());
    }

    #[test]
    fn enabling_the_histogram_clears_any_stale_samples() {
        let m = ConfigMutator::new(false);
        m.service.microbenchmarks_histogram.record();
        assert_eq!(m.service.microbenchmarks_histogram.sample_count(), 1);

        m.set("context=service;microbenchmarks-histogram=true").unwrap();
        assert_eq!(m.service.microbenchmarks_histogram.sample_count(), 0);
    }

    #[test]
    fn disabling_the_histogram_clears_samples_recorded_while_enabled() {
        let m = ConfigMutator::new(false);
        m.set("context=service;microbenchmarks-histogram=true").unwrap();
        m.service.microbenchmarks_histogram.record();
        assert_eq!(m.service.microbenchmarks_histogram.sample_count(), 1);

        m.set("context=service;microbenchmarks-histogram=false").unwrap();
        assert_eq!(m.service.microbenchmarks_histogram.sample_count(), 0);
    }

    #[test]
    fn re_setting_the_same_histogram_value_does_not_clear_samples() {
        let m = ConfigMutator::new(false);
        m.set("context=service;microbenchmarks-histogram=true").unwrap();
        m.service.microbenchmarks_histogram.record();

        m.set("context=service;microbenchmarks-histogram=true").unwrap();
        assert_eq!(m.service.microbenchmarks_histogram.sample_count(), 1);
    }

    #[test]
    fn info_threads_is_readable_after_set() {
        let m = ConfigMutator::new(false);
        m.set("context=service;info-threads=3").unwrap();
        assert_eq!(m.service.info_threads.load(std::sync::atomic::Ordering::Relaxed), 3);
    }

    #[test]
    fn info_threads_rejects_values_past_the_ceiling() {
        let m = ConfigMutator::new(false);
        assert!(m.set("context=service;info-threads=9000").is_err());
    }
}
